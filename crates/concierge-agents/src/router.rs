//! Message router
//!
//! One `handle` call drives a bounded decision loop: ask the completion
//! backend for a routing decision, execute the capability it picked, feed
//! the output back as a tool turn, repeat until the backend answers in
//! plain text or the iteration cap is reached. Capability failures become
//! fixed-text tool turns so a single broken capability cannot take the
//! whole conversation down.

use concierge_common::{ConciergeError, Conversation, Result, Turn};
use concierge_core::{BackendReply, CapabilityCall, CompletionBackend, SessionStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::registry::CapabilityRegistry;

/// Reply when the iteration cap is reached without a final answer
pub const EXHAUSTED_REPLY: &str =
    "I was unable to complete this request. Please try rephrasing or simplifying it.";

/// Reply returned to transports when the completion backend itself fails
pub const BACKEND_UNAVAILABLE: &str =
    "The assistant is temporarily unavailable. Please try again later.";

/// Where the decision loop stands after the last transition
enum LoopState {
    /// Waiting for the next routing decision
    AwaitingDecision,
    /// The backend picked a capability to run
    InvokingCapability(CapabilityCall),
    /// The backend produced a final answer
    Finalizing(String),
    /// Iteration cap reached without a final answer
    Exhausted,
}

pub struct Router {
    backend: Arc<dyn CompletionBackend>,
    registry: Arc<CapabilityRegistry>,
    store: Arc<dyn SessionStore>,
    max_iterations: usize,
}

impl Router {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: Arc<CapabilityRegistry>,
        store: Arc<dyn SessionStore>,
        max_iterations: usize,
    ) -> Self {
        Router {
            backend,
            registry,
            store,
            max_iterations,
        }
    }

    /// Process one user message and return `(reply, session_key)`
    ///
    /// A missing session key starts a fresh session under a generated key;
    /// the key is returned either way so callers can continue the session.
    pub async fn handle(&self, message: &str, session_key: Option<&str>) -> Result<(String, String)> {
        if message.trim().is_empty() {
            return Err(ConciergeError::Generic("empty message".to_string()));
        }

        let key = match session_key {
            Some(key) => key.to_string(),
            None => Conversation::generate_key(),
        };

        let mut conversation = match self.store.load(&key).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => Conversation::new(&key),
            Err(e) => {
                // Continuity degrades but the message still gets answered
                warn!("Session load failed for '{}': {}", key, e);
                Conversation::new(&key)
            }
        };

        info!(
            "Handling message for session '{}' ({} prior turns)",
            key,
            conversation.len()
        );
        conversation.push(Turn::user(message));

        let tools = self.registry.router_tools();
        let mut state = LoopState::AwaitingDecision;
        let mut iterations = 0;

        let reply = loop {
            match state {
                LoopState::AwaitingDecision => {
                    if iterations >= self.max_iterations {
                        state = LoopState::Exhausted;
                        continue;
                    }
                    iterations += 1;
                    state = match self.backend.decide(&conversation.turns, &tools).await {
                        Ok(BackendReply::Answer(text)) => LoopState::Finalizing(text),
                        Ok(BackendReply::Invoke(call)) => LoopState::InvokingCapability(call),
                        Err(e) => {
                            error!("Routing decision failed: {}", e);
                            return Err(ConciergeError::Backend(
                                BACKEND_UNAVAILABLE.to_string(),
                            ));
                        }
                    };
                }
                LoopState::InvokingCapability(call) => {
                    debug!(
                        "Iteration {}: delegating to '{}' with query '{}'",
                        iterations, call.name, call.query
                    );
                    let output = self.invoke_capability(&call).await;
                    conversation.push(Turn::tool(&call.name, output, Some(call.call_id)));
                    state = LoopState::AwaitingDecision;
                }
                LoopState::Finalizing(text) => break text,
                LoopState::Exhausted => {
                    warn!(
                        "Iteration cap {} reached for session '{}'",
                        self.max_iterations, key
                    );
                    break EXHAUSTED_REPLY.to_string();
                }
            }
        };

        conversation.push(Turn::assistant(&reply));

        if let Err(e) = self.store.save(&conversation).await {
            // The reply already exists; losing one save must not fail the call
            error!("Session save failed for '{}': {}", key, e);
        }

        Ok((reply, key))
    }

    /// Run one capability call, mapping every failure to fixed user-facing
    /// text so the loop always gets a tool turn back
    async fn invoke_capability(&self, call: &CapabilityCall) -> String {
        let capability = match self.registry.instantiate(&call.name).await {
            Ok(capability) => capability,
            Err(e) => {
                error!("Cannot use capability '{}': {}", call.name, e);
                return format!("The {} capability is currently unavailable.", call.name);
            }
        };

        match capability.process(&call.query).await {
            Ok(output) => output,
            Err(e) => {
                error!("Capability '{}' failed: {}", call.name, e);
                format!("The {} capability failed to handle this request.", call.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityBackends;
    use async_trait::async_trait;
    use concierge_common::{RetrievalConfig, Role};
    use concierge_core::{KnowledgeRetriever, MemorySessionStore, RetrievedChunk, ToolSpec};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        replies: Mutex<VecDeque<BackendReply>>,
        decisions: AtomicUsize,
        fail_completions: bool,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<BackendReply>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                replies: Mutex::new(replies.into()),
                decisions: AtomicUsize::new(0),
                fail_completions: false,
            })
        }

        /// Like `new`, but every `complete` call fails, so any capability
        /// that generates text errors out mid-process
        fn with_failing_completions(replies: Vec<BackendReply>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                replies: Mutex::new(replies.into()),
                decisions: AtomicUsize::new(0),
                fail_completions: true,
            })
        }

        fn invoke(name: &str, query: &str) -> BackendReply {
            BackendReply::Invoke(CapabilityCall {
                name: name.to_string(),
                query: query.to_string(),
                call_id: "call_1".to_string(),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn decide(&self, _turns: &[Turn], _tools: &[ToolSpec]) -> Result<BackendReply> {
            self.decisions.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ConciergeError::Backend("script exhausted".to_string()))
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            if self.fail_completions {
                return Err(ConciergeError::Backend("model rejected request".to_string()));
            }
            Ok("generated answer".to_string())
        }
    }

    struct StubRetriever;

    #[async_trait]
    impl KnowledgeRetriever for StubRetriever {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(vec![RetrievedChunk {
                content: "refunds take 14 days".to_string(),
                metadata: Default::default(),
                score: 0.92,
            }])
        }
    }

    fn registry_with(backend: Arc<dyn CompletionBackend>) -> Arc<CapabilityRegistry> {
        let backends = Arc::new(CapabilityBackends {
            completion: backend,
            retriever: Arc::new(StubRetriever),
            retrieval: RetrievalConfig::default(),
        });
        let mut registry = CapabilityRegistry::new(backends);
        registry
            .load_yaml_str(
                "capabilities:\n\
                 - name: knowledge_search\n  \
                   kind: knowledge\n  \
                   description: Searches the knowledge base\n",
            )
            .unwrap();
        Arc::new(registry)
    }

    fn router(backend: Arc<ScriptedBackend>, max_iterations: usize) -> (Router, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let registry = registry_with(backend.clone());
        (
            Router::new(backend, registry, store.clone(), max_iterations),
            store,
        )
    }

    #[tokio::test]
    async fn test_direct_answer_persists_two_turns() {
        let backend = ScriptedBackend::new(vec![BackendReply::Answer("Hi there".to_string())]);
        let (router, store) = router(backend, 5);

        let (reply, key) = router.handle("hello", Some("s1")).await.unwrap();
        assert_eq!(reply, "Hi there");
        assert_eq!(key, "s1");

        let convo = store.load("s1").await.unwrap().expect("persisted");
        assert_eq!(convo.len(), 2);
        assert_eq!(convo.turns[0].role, Role::User);
        assert_eq!(convo.turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_delegation_adds_tool_turn() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::invoke("knowledge_search", "refund policy"),
            BackendReply::Answer("Refunds take 14 days.".to_string()),
        ]);
        let (router, store) = router(backend.clone(), 5);

        let (reply, _) = router.handle("what is the refund policy", Some("s1")).await.unwrap();
        assert_eq!(reply, "Refunds take 14 days.");
        assert_eq!(backend.decisions.load(Ordering::SeqCst), 2);

        let convo = store.load("s1").await.unwrap().expect("persisted");
        // user, tool, assistant
        assert_eq!(convo.len(), 3);
        assert_eq!(convo.turns[1].role, Role::Tool);
        assert_eq!(convo.turns[1].capability.as_deref(), Some("knowledge_search"));
        assert_eq!(convo.turns[1].content, "generated answer");
    }

    #[tokio::test]
    async fn test_iteration_cap_yields_fixed_reply() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::invoke("knowledge_search", "a"),
            ScriptedBackend::invoke("knowledge_search", "b"),
            ScriptedBackend::invoke("knowledge_search", "c"),
        ]);
        let (router, store) = router(backend.clone(), 2);

        let (reply, _) = router.handle("loop forever", Some("s1")).await.unwrap();
        assert_eq!(reply, EXHAUSTED_REPLY);
        // exactly max_iterations decisions, no more
        assert_eq!(backend.decisions.load(Ordering::SeqCst), 2);

        let convo = store.load("s1").await.unwrap().expect("persisted");
        // user, two tool turns, fallback assistant turn
        assert_eq!(convo.len(), 4);
        assert_eq!(convo.turns[3].content, EXHAUSTED_REPLY);
    }

    #[tokio::test]
    async fn test_failing_capability_adds_one_tool_turn_and_continues() {
        // knowledge_search retrieves fine but its generation call errors,
        // so process() itself returns Err
        let backend = ScriptedBackend::with_failing_completions(vec![
            ScriptedBackend::invoke("knowledge_search", "refund policy"),
            BackendReply::Answer("recovered".to_string()),
        ]);
        let (router, store) = router(backend.clone(), 5);

        let (reply, _) = router.handle("what is the refund policy", Some("s1")).await.unwrap();
        assert_eq!(reply, "recovered");
        // the loop must have taken a second decision after the failure
        assert_eq!(backend.decisions.load(Ordering::SeqCst), 2);

        let convo = store.load("s1").await.unwrap().expect("persisted");
        // user, one generic-failure tool turn, assistant
        assert_eq!(convo.len(), 3);
        let tool_turns: Vec<&Turn> = convo
            .turns
            .iter()
            .filter(|turn| turn.role == Role::Tool)
            .collect();
        assert_eq!(tool_turns.len(), 1);
        assert_eq!(
            tool_turns[0].content,
            "The knowledge_search capability failed to handle this request."
        );
        // the raw failure detail never reaches the conversation
        assert!(!tool_turns[0].content.contains("model rejected request"));
    }

    #[tokio::test]
    async fn test_unknown_capability_becomes_tool_turn() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::invoke("no_such", "whatever"),
            BackendReply::Answer("done".to_string()),
        ]);
        let (router, store) = router(backend, 5);

        let (reply, _) = router.handle("try it", Some("s1")).await.unwrap();
        assert_eq!(reply, "done");

        let convo = store.load("s1").await.unwrap().expect("persisted");
        assert_eq!(convo.turns[1].role, Role::Tool);
        assert!(convo.turns[1].content.contains("currently unavailable"));
    }

    #[tokio::test]
    async fn test_backend_failure_saves_nothing() {
        let backend = ScriptedBackend::new(vec![]);
        let (router, store) = router(backend, 5);

        let err = router.handle("hello", Some("s1")).await.unwrap_err();
        assert!(matches!(err, ConciergeError::Backend(_)));
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_generates_one() {
        let backend = ScriptedBackend::new(vec![BackendReply::Answer("hi".to_string())]);
        let (router, store) = router(backend, 5);

        let (_, key) = router.handle("hello", None).await.unwrap();
        assert!(!key.is_empty());
        assert!(store.load(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_continuity_across_calls() {
        let backend = ScriptedBackend::new(vec![
            BackendReply::Answer("first".to_string()),
            BackendReply::Answer("second".to_string()),
        ]);
        let (router, store) = router(backend, 5);

        router.handle("one", Some("s1")).await.unwrap();
        router.handle("two", Some("s1")).await.unwrap();

        let convo = store.load("s1").await.unwrap().expect("persisted");
        assert_eq!(convo.len(), 4);
        assert_eq!(convo.turns[2].content, "two");
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let backend = ScriptedBackend::new(vec![]);
        let (router, _) = router(backend.clone(), 5);

        assert!(router.handle("   ", Some("s1")).await.is_err());
        assert_eq!(backend.decisions.load(Ordering::SeqCst), 0);
    }
}
