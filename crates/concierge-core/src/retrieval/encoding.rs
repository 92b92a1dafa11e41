//! Best-effort repair of mojibake in retrieved content
//!
//! Documents ingested through lossy pipelines sometimes arrive with UTF-8
//! byte sequences that were mis-decoded as Latin-1/Windows-1252 (the classic
//! "ÐŸÑ€Ð¸Ð²ÐµÑ‚" corruption). Repair re-encodes each character to its
//! original byte and re-decodes the result as UTF-8. If the text does not
//! look corrupted, or the repair fails, the original text passes through
//! unchanged - a garbled chunk must never fail the whole request.

use tracing::debug;

/// Repair mojibake if the text carries known corruption signatures,
/// otherwise return the input unchanged
pub fn repair_mojibake(text: &str) -> String {
    if !looks_corrupted(text) {
        return text.to_string();
    }

    match reencode_as_bytes(text).and_then(|bytes| String::from_utf8(bytes).ok()) {
        Some(fixed) if plausible_repair(&fixed) => {
            debug!("Repaired mojibake in retrieved content");
            fixed
        }
        _ => text.to_string(),
    }
}

/// Signature characters that appear when UTF-8 multi-byte sequences are
/// decoded as Latin-1/Windows-1252: lead bytes 0xC2-0xD1 become Â/Ã/Ð/Ñ,
/// and 0xE2 80 xx punctuation becomes â€¦ sequences
fn looks_corrupted(text: &str) -> bool {
    text.contains('Ã') || text.contains('Ð') || text.contains('Ñ') || text.contains("â€")
}

/// Map each character back to the single byte it was decoded from.
/// Characters in 0x80-0x9F travel through the Windows-1252 table; anything
/// above 0xFF means the text was never a byte-per-char decode and the
/// repair does not apply.
fn reencode_as_bytes(text: &str) -> Option<Vec<u8>> {
    text.chars().map(char_to_byte).collect()
}

fn char_to_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if code <= 0xFF {
        return Some(code as u8);
    }
    // Windows-1252 0x80-0x9F range
    let byte = match c {
        '\u{20AC}' => 0x80, // €
        '\u{201A}' => 0x82, // ‚
        '\u{0192}' => 0x83, // ƒ
        '\u{201E}' => 0x84, // „
        '\u{2026}' => 0x85, // …
        '\u{2020}' => 0x86, // †
        '\u{2021}' => 0x87, // ‡
        '\u{02C6}' => 0x88, // ˆ
        '\u{2030}' => 0x89, // ‰
        '\u{0160}' => 0x8A, // Š
        '\u{2039}' => 0x8B, // ‹
        '\u{0152}' => 0x8C, // Œ
        '\u{017D}' => 0x8E, // Ž
        '\u{2018}' => 0x91, // '
        '\u{2019}' => 0x92, // '
        '\u{201C}' => 0x93, // "
        '\u{201D}' => 0x94, // "
        '\u{2022}' => 0x95, // •
        '\u{2013}' => 0x96, // –
        '\u{2014}' => 0x97, // —
        '\u{02DC}' => 0x98, // ˜
        '\u{2122}' => 0x99, // ™
        '\u{0161}' => 0x9A, // š
        '\u{203A}' => 0x9B, // ›
        '\u{0153}' => 0x9C, // œ
        '\u{017E}' => 0x9E, // ž
        '\u{0178}' => 0x9F, // Ÿ
        _ => return None,
    };
    Some(byte)
}

/// A repair is kept only when it produced text that no longer carries the
/// corruption signatures, or gained Cyrillic characters the corrupted form
/// could not contain
fn plausible_repair(fixed: &str) -> bool {
    let has_cyrillic = fixed
        .chars()
        .any(|c| ('\u{0400}'..='\u{04FF}').contains(&c));
    has_cyrillic || !looks_corrupted(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_passes_through() {
        assert_eq!(repair_mojibake("refund policy"), "refund policy");
        assert_eq!(repair_mojibake("Привет"), "Привет");
    }

    #[test]
    fn test_repairs_cyrillic_mojibake() {
        // "Привет" UTF-8 bytes mis-decoded as Windows-1252
        assert_eq!(repair_mojibake("ÐŸÑ€Ð¸Ð²ÐµÑ‚"), "Привет");
    }

    #[test]
    fn test_repairs_punctuation_mojibake() {
        // Right single quote (U+2019) mangled into "â€™"
        assert_eq!(repair_mojibake("itâ€™s here"), "it’s here");
    }

    #[test]
    fn test_unrepairable_text_passes_through() {
        // Contains a signature char but also CJK, so byte-per-char re-encode
        // cannot apply; content must survive untouched
        let mixed = "Ã 漢字";
        assert_eq!(repair_mojibake(mixed), mixed);
    }
}
