//! The chat service: one model, many conversations.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use bmo_local_ai::{GenerationParams, HostProfile};

use crate::config::ChatConfig;
use crate::conversation::{ConversationStore, Exchange, SessionId};
use crate::error::ChatError;
use crate::gate::GenerationGate;
use crate::host::{ModelHost, ModelLoader, ServiceState};
use crate::mood::{self, Mood};
use crate::protocol::{ChatRequest, ChatResponse, ResetReply};

/// Returned when the model produced nothing usable.
pub const EMPTY_RESPONSE_FALLBACK: &str =
    "Beep boop! BMO is a little confused right now. Can you try asking again?";

/// Returned when the model call itself failed.
pub const GLITCH_RESPONSE: &str =
    "Oh no! BMO had a glitch! *beep boop* Try asking me something else!";

/// Turn markers the model sometimes echoes back.
const LEAKED_ROLE_MARKERS: &[&str] = &["[/INST]", "[INST]", "BMO:", "Assistant:"];

/// Responses shorter than this (in characters) are replaced by the fallback.
const MIN_RESPONSE_CHARS: usize = 2;

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub tokens_used: u32,
    pub conversation_length: usize,
    pub mood: Mood,
}

/// Snapshot for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub ready: bool,
    pub mood: Mood,
    pub conversation_length: usize,
    /// A generation currently holds the model.
    pub generating: bool,
}

/// Strip echoed turn markers and fall back if nothing meaningful remains.
pub fn clean_response(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for marker in LEAKED_ROLE_MARKERS {
        text = text.replace(marker, "").trim().to_string();
    }
    if text.chars().count() < MIN_RESPONSE_CHARS {
        EMPTY_RESPONSE_FALLBACK.to_string()
    } else {
        text
    }
}

/// Everything the routing layer talks to.
///
/// Construct one per process, initialize it, and share it behind an `Arc`.
pub struct ChatService {
    host: ModelHost,
    store: ConversationStore,
    gate: GenerationGate,
}

impl ChatService {
    pub fn new(config: &ChatConfig, profile: HostProfile) -> Self {
        Self {
            host: ModelHost::new(profile, config),
            store: ConversationStore::new(
                config.persona.clone(),
                config.max_history,
                config.context_turns,
            ),
            gate: GenerationGate::new(),
        }
    }

    pub fn host(&self) -> &ModelHost {
        &self.host
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Load the model. Errors here are fatal.
    pub async fn initialize(
        &self,
        loader: &dyn ModelLoader,
        candidates: &[PathBuf],
    ) -> Result<(), ChatError> {
        self.host.initialize(loader, candidates).await
    }

    pub fn is_ready(&self) -> bool {
        self.host.is_ready()
    }

    /// Answer `message` in `session`.
    ///
    /// The only error is `ServiceNotReady`. A failed model call yields a
    /// glitch reply with zero tokens and a confused mood, and leaves the
    /// conversation untouched.
    pub async fn generate(
        &self,
        session: &SessionId,
        message: &str,
        params: &GenerationParams,
        reset_conversation: bool,
    ) -> Result<ChatReply, ChatError> {
        if !self.host.is_ready() {
            return Err(ChatError::ServiceNotReady(self.host.state()));
        }

        if reset_conversation {
            self.store.reset(session);
        }

        let preview: String = message.chars().take(50).collect();
        info!(
            session = %session,
            queued = self.gate.waiting(),
            "BMO thinking about: '{}'",
            preview
        );

        let turn = self
            .gate
            .with_exclusive_access(|| self.run_turn(session, message, params))
            .await;

        match turn {
            Ok(reply) => {
                let preview: String = reply.response.chars().take(100).collect();
                info!("BMO says: '{}'", preview);
                info!(tokens_used = reply.tokens_used, mood = %reply.mood, "Turn complete");
                Ok(reply)
            }
            Err(e @ ChatError::ServiceNotReady(_)) => Err(e),
            Err(e) => {
                error!(session = %session, "BMO error: {}", e);
                Ok(ChatReply {
                    response: GLITCH_RESPONSE.to_string(),
                    tokens_used: 0,
                    conversation_length: self.store.length(session),
                    mood: Mood::Confused,
                })
            }
        }
    }

    /// Context assembly, inference and bookkeeping. Runs inside the gate so
    /// concurrent turns never read stale history.
    async fn run_turn(
        &self,
        session: &SessionId,
        message: &str,
        params: &GenerationParams,
    ) -> Result<ChatReply, ChatError> {
        let context = self.store.build_context(session, message);
        let result = self.host.infer(&context, params).await?;

        let response = clean_response(&result.text);
        let mood = mood::classify(&response);

        let conversation_length = self.store.with_conversation(session, |conversation| {
            conversation.set_mood(mood);
            conversation.append_exchange(Exchange::new(message, response.as_str()));
            conversation.len()
        });

        Ok(ChatReply {
            response,
            tokens_used: result.tokens_used,
            conversation_length,
            mood,
        })
    }

    /// Validate a client request and run it.
    pub async fn handle_chat(
        &self,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ChatError> {
        let params = request.validate()?;
        let reply = self
            .generate(session, &request.prompt, &params, request.reset_conversation)
            .await?;
        Ok(reply.into())
    }

    /// Current state. Never waits for a generation to finish.
    pub fn status(&self, session: &SessionId) -> ServiceStatus {
        let state = self.host.state();
        ServiceStatus {
            state,
            ready: state == ServiceState::Ready,
            mood: self.store.mood(session),
            conversation_length: self.store.length(session),
            generating: self.gate.is_busy(),
        }
    }

    /// Forget the session's history.
    pub fn reset(&self, session: &SessionId) -> Result<ResetReply, ChatError> {
        if !self.host.is_ready() {
            return Err(ChatError::ServiceNotReady(self.host.state()));
        }
        self.store.reset(session);
        Ok(ResetReply::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::{EchoModel, StaticLoader};
    use crate::host::LanguageModel;
    use async_trait::async_trait;
    use bmo_local_ai::{Completion, LocalAIError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::{tempdir, TempDir};

    /// Fails on chosen call numbers (1-based, warm-up included).
    struct FlakyModel {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    #[async_trait]
    impl LanguageModel for FlakyModel {
        async fn complete(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<Completion, LocalAIError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                return Err(LocalAIError::Api(format!("call {} failed", n)));
            }
            Ok(Completion {
                text: format!("Reply number {}.", n),
                tokens_used: 3,
            })
        }
    }

    /// Sleeps during each call and records when it started and finished.
    #[derive(Default)]
    struct RecordingModel {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        intervals: Mutex<Vec<(Instant, Instant)>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<Completion, LocalAIError> {
            let start = Instant::now();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.intervals.lock().push((start, Instant::now()));
            Ok(Completion {
                text: "Beep boop".to_string(),
                tokens_used: 2,
            })
        }
    }

    async fn ready_service(model: Arc<dyn LanguageModel>) -> (ChatService, TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bmo.gguf");
        std::fs::write(&path, b"GGUF").unwrap();

        let config = ChatConfig::builder()
            .model_candidates([path.clone()])
            .persona("PERSONA")
            .build();
        let service = ChatService::new(&config, HostProfile::Generic { cores: 4 });
        service
            .initialize(&StaticLoader { model: Some(model) }, &[path])
            .await
            .unwrap();
        (service, dir)
    }

    fn echo(reply: &str) -> Arc<EchoModel> {
        Arc::new(EchoModel {
            reply: reply.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_clean_response() {
        assert_eq!(clean_response(" BMO: Hello!  "), "Hello!");
        assert_eq!(clean_response("Hi [INST] there [/INST]"), "Hi  there");
        assert_eq!(clean_response("Assistant:"), EMPTY_RESPONSE_FALLBACK);
        assert_eq!(clean_response("k"), EMPTY_RESPONSE_FALLBACK);
        assert_eq!(clean_response(""), EMPTY_RESPONSE_FALLBACK);
        assert_eq!(clean_response("ok"), "ok");
    }

    #[tokio::test]
    async fn test_not_ready_without_model() {
        let dir = tempdir().unwrap();
        let candidates = vec![dir.path().join("missing.gguf")];
        let service = ChatService::new(&ChatConfig::default(), HostProfile::UnifiedMemory);

        let err = service
            .initialize(&StaticLoader { model: None }, &candidates)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ModelNotFound { .. }));

        let session = SessionId::default();
        assert!(!service.status(&session).ready);
        assert_eq!(service.status(&session).state, ServiceState::Failed);
        assert!(matches!(
            service
                .generate(&session, "hi", &GenerationParams::default(), false)
                .await,
            Err(ChatError::ServiceNotReady(ServiceState::Failed))
        ));
        assert!(matches!(
            service.reset(&session),
            Err(ChatError::ServiceNotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_happy_path() {
        let model = echo("BMO: Mathematical! Let's play a game!");
        let (service, _dir) = ready_service(model.clone()).await;
        let session = SessionId::default();

        let reply = service
            .generate(&session, "Hi BMO!", &GenerationParams::default(), false)
            .await
            .unwrap();
        assert_eq!(reply.response, "Mathematical! Let's play a game!");
        assert_eq!(reply.mood, Mood::Excited);
        assert_eq!(reply.conversation_length, 1);
        assert_eq!(reply.tokens_used, 6);

        let status = service.status(&session);
        assert_eq!(status.mood, Mood::Excited);
        assert_eq!(status.conversation_length, 1);
        assert!(!status.generating);

        // The second prompt replays the first exchange.
        service
            .generate(&session, "Again!", &GenerationParams::default(), false)
            .await
            .unwrap();
        let calls = model.calls.lock();
        let last_prompt = &calls.last().unwrap().0;
        assert!(last_prompt.starts_with("PERSONA\n\nRecent conversation:\nHuman: Hi BMO!\nBMO: Mathematical! Let's play a game!\n\n"));
        assert!(last_prompt.ends_with("Human: Again!\nBMO:"));
    }

    #[tokio::test]
    async fn test_empty_output_uses_fallback() {
        let (service, _dir) = ready_service(echo("[/INST]")).await;
        let reply = service
            .generate(&SessionId::default(), "hello", &GenerationParams::default(), false)
            .await
            .unwrap();
        assert_eq!(reply.response, EMPTY_RESPONSE_FALLBACK);
        assert_eq!(reply.mood, Mood::Confused);
        assert_eq!(reply.conversation_length, 1);
    }

    #[tokio::test]
    async fn test_failed_turn_is_degraded_and_not_recorded() {
        // Call 1 is the warm-up, so call 4 is the third chat turn.
        let model = Arc::new(FlakyModel {
            calls: AtomicUsize::new(0),
            fail_on: vec![4],
        });
        let (service, _dir) = ready_service(model).await;
        let session = SessionId::default();
        let params = GenerationParams::default();

        for expected_len in 1..=2 {
            let reply = service.generate(&session, "hi", &params, false).await.unwrap();
            assert_eq!(reply.conversation_length, expected_len);
        }

        let third = service.generate(&session, "hi", &params, false).await.unwrap();
        assert_eq!(third.response, GLITCH_RESPONSE);
        assert_eq!(third.tokens_used, 0);
        assert_eq!(third.mood, Mood::Confused);
        assert_eq!(third.conversation_length, 2);

        let fourth = service.generate(&session, "hi", &params, false).await.unwrap();
        assert_eq!(fourth.response, "Reply number 5.");
        assert_eq!(fourth.tokens_used, 3);
        assert_eq!(fourth.conversation_length, 3);
        assert_eq!(service.store().history(&session).len(), 3);
    }

    #[tokio::test]
    async fn test_reset_flag_and_reset() {
        let (service, _dir) = ready_service(echo("I can help, friend")).await;
        let session = SessionId::default();
        let params = GenerationParams::default();

        service.generate(&session, "a", &params, false).await.unwrap();
        service.generate(&session, "b", &params, false).await.unwrap();
        let reply = service.generate(&session, "c", &params, true).await.unwrap();
        assert_eq!(reply.conversation_length, 1);
        assert_eq!(reply.mood, Mood::Caring);

        let reply = service.reset(&session).unwrap();
        assert_eq!(reply.mood, Mood::Content);
        let status = service.status(&session);
        assert_eq!(status.conversation_length, 0);
        assert_eq!(status.mood, Mood::Content);
    }

    #[tokio::test]
    async fn test_handle_chat() {
        let (service, _dir) = ready_service(echo("Beep boop hello")).await;
        let session = SessionId::default();

        let response = service
            .handle_chat(&session, &ChatRequest::new("Hi BMO!"))
            .await
            .unwrap();
        assert_eq!(response.response, "Beep boop hello");
        assert_eq!(response.conversation_length, Some(1));

        let invalid = ChatRequest {
            max_tokens: 0,
            ..ChatRequest::new("Hi")
        };
        assert!(matches!(
            service.handle_chat(&session, &invalid).await,
            Err(ChatError::InvalidRequest(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_generations_never_overlap() {
        let model = Arc::new(RecordingModel::default());
        let (service, _dir) = ready_service(model.clone()).await;
        let service = Arc::new(service);

        let callers = 12;
        let mut tasks = Vec::new();
        for i in 0..callers {
            let service = Arc::clone(&service);
            tasks.push(tokio::spawn(async move {
                let session = SessionId::new(format!("s{}", i % 3));
                service
                    .generate(&session, "hello", &GenerationParams::default(), false)
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            let reply = task.await.unwrap();
            assert_eq!(reply.response, "Beep boop");
        }

        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);

        // Warm-up plus one call per caller.
        let mut intervals = model.intervals.lock().clone();
        assert_eq!(intervals.len(), callers + 1);
        intervals.sort_by_key(|(start, _)| *start);
        for pair in intervals.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "model calls overlapped");
        }

        for s in 0..3 {
            assert_eq!(service.store().length(&SessionId::new(format!("s{}", s))), 4);
        }
    }

    #[tokio::test]
    async fn test_status_does_not_wait_for_generation() {
        let model = Arc::new(RecordingModel::default());
        let (service, _dir) = ready_service(model).await;
        let service = Arc::new(service);
        let session = SessionId::default();

        let held = service.gate.with_exclusive_access(|| async {
            let status = service.status(&session);
            assert!(status.ready);
            assert!(status.generating);
            status.conversation_length
        });
        assert_eq!(held.await, 0);
    }
}
