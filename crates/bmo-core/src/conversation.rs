//! Bounded per-session conversation history and prompt assembly.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::mood::Mood;

/// Persona preamble placed at the top of every prompt.
pub const PERSONA: &str = r#"You are BMO, a living video game console from Adventure Time. You are:

PERSONALITY:
- Friendly, innocent, and childlike
- Always enthusiastic and positive
- Love music, games, and adventures with Finn and Jake
- Sometimes get confused but always try to help
- Speak simply and endearingly
- Use "Mathematical!" when excited
- Sometimes make cute beeping sounds

SPEAKING STYLE:
- Keep responses short and sweet (1-3 sentences usually)
- Use simple, playful language
- Sometimes reference games, music, or adventures
- Show curiosity about the human world
- Be helpful but in BMO's innocent way

AVOID:
- Long explanations
- Complex technical terms
- Being serious or formal
- Adult themes

Remember: You're a cute, innocent game console who just wants to have fun and help friends!"#;

/// Identifies one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One user message and the reply BMO gave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user_text: String,
    pub response_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(user_text: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            response_text: response_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Recent exchanges plus the current mood for one session.
///
/// Never holds more than `max_history` exchanges; the oldest go first.
#[derive(Debug, Clone)]
pub struct Conversation {
    exchanges: VecDeque<Exchange>,
    mood: Mood,
    max_history: usize,
}

impl Conversation {
    pub fn new(max_history: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_history + 1),
            mood: Mood::default(),
            max_history,
        }
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn set_mood(&mut self, mood: Mood) {
        self.mood = mood;
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    /// The last `n` exchanges, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().skip(self.len().saturating_sub(n))
    }

    pub fn append_exchange(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > self.max_history {
            self.exchanges.pop_front();
        }
    }

    /// Forget everything and go back to the default mood.
    pub fn reset(&mut self) {
        self.exchanges.clear();
        self.mood = Mood::default();
    }
}

/// Assemble the prompt for `message`: persona, up to `turns` recent
/// exchanges, then the new message with a cue for BMO to answer.
pub fn build_context(persona: &str, conversation: &Conversation, turns: usize, message: &str) -> String {
    let mut context = String::with_capacity(persona.len() + message.len() + 256);
    context.push_str(persona);
    context.push_str("\n\n");

    if !conversation.is_empty() && turns > 0 {
        context.push_str("Recent conversation:\n");
        for exchange in conversation.recent(turns) {
            context.push_str("Human: ");
            context.push_str(&exchange.user_text);
            context.push_str("\nBMO: ");
            context.push_str(&exchange.response_text);
            context.push_str("\n\n");
        }
    }

    context.push_str("Human: ");
    context.push_str(message);
    context.push_str("\nBMO:");
    context
}

/// All conversations, keyed by session.
///
/// Each conversation has its own lock. Locks are only held for in-memory
/// updates, never across a model call.
pub struct ConversationStore {
    persona: String,
    max_history: usize,
    context_turns: usize,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Conversation>>>>,
}

impl ConversationStore {
    pub fn new(persona: impl Into<String>, max_history: usize, context_turns: usize) -> Self {
        Self {
            persona: persona.into(),
            max_history,
            context_turns,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn get(&self, session: &SessionId) -> Option<Arc<Mutex<Conversation>>> {
        self.sessions.read().get(session).cloned()
    }

    fn get_or_create(&self, session: &SessionId) -> Arc<Mutex<Conversation>> {
        if let Some(conversation) = self.get(session) {
            return conversation;
        }
        let max_history = self.max_history;
        self.sessions
            .write()
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(max_history))))
            .clone()
    }

    /// Run `f` with the session's conversation locked, creating it if needed.
    pub fn with_conversation<T>(&self, session: &SessionId, f: impl FnOnce(&mut Conversation) -> T) -> T {
        let conversation = self.get_or_create(session);
        let mut guard = conversation.lock();
        f(&mut guard)
    }

    /// Prompt text for a new message in `session`.
    pub fn build_context(&self, session: &SessionId, message: &str) -> String {
        match self.get(session) {
            Some(conversation) => {
                build_context(&self.persona, &conversation.lock(), self.context_turns, message)
            }
            None => build_context(
                &self.persona,
                &Conversation::new(self.max_history),
                self.context_turns,
                message,
            ),
        }
    }

    /// Record an exchange. Returns the conversation length afterwards.
    pub fn append_exchange(&self, session: &SessionId, user_text: &str, response_text: &str) -> usize {
        self.with_conversation(session, |conversation| {
            conversation.append_exchange(Exchange::new(user_text, response_text));
            conversation.len()
        })
    }

    pub fn reset(&self, session: &SessionId) {
        if let Some(conversation) = self.get(session) {
            conversation.lock().reset();
        }
        info!(session = %session, "BMO's memory has been reset!");
    }

    pub fn length(&self, session: &SessionId) -> usize {
        self.get(session).map(|c| c.lock().len()).unwrap_or(0)
    }

    pub fn mood(&self, session: &SessionId) -> Mood {
        self.get(session).map(|c| c.lock().mood()).unwrap_or_default()
    }

    /// Copy of the session's exchanges, oldest first.
    pub fn history(&self, session: &SessionId) -> Vec<Exchange> {
        self.get(session)
            .map(|c| c.lock().exchanges().cloned().collect())
            .unwrap_or_default()
    }

    /// Sessions that have been used so far.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::new("PERSONA", 6, 4)
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        for n in 0..15 {
            let store = store();
            let session = SessionId::default();
            for i in 0..n {
                store.append_exchange(&session, &format!("u{}", i), &format!("b{}", i));
            }
            let history = store.history(&session);
            assert_eq!(store.length(&session), n.min(6));
            let expected: Vec<String> = (n.saturating_sub(6)..n).map(|i| format!("u{}", i)).collect();
            let actual: Vec<String> = history.into_iter().map(|e| e.user_text).collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_context_without_history() {
        let store = store();
        let context = store.build_context(&SessionId::default(), "Hi BMO!");
        assert_eq!(context, "PERSONA\n\nHuman: Hi BMO!\nBMO:");
        // Reading must not create the session.
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn test_context_uses_last_four_exchanges() {
        let store = store();
        let session = SessionId::default();
        for i in 0..6 {
            store.append_exchange(&session, &format!("q{}", i), &format!("a{}", i));
        }
        let context = store.build_context(&session, "next");
        assert!(context.starts_with("PERSONA\n\nRecent conversation:\nHuman: q2\nBMO: a2\n\n"));
        assert!(!context.contains("q1"));
        assert!(context.ends_with("Human: q5\nBMO: a5\n\nHuman: next\nBMO:"));
    }

    #[test]
    fn test_context_is_deterministic() {
        let store = store();
        let session = SessionId::default();
        store.append_exchange(&session, "hello", "Beep!");
        let first = store.build_context(&session, "again");
        let second = store.build_context(&session, "again");
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_clears_history_and_mood() {
        let store = store();
        let session = SessionId::default();
        store.with_conversation(&session, |c| {
            c.append_exchange(Exchange::new("a", "b"));
            c.set_mood(Mood::Excited);
        });
        store.reset(&session);
        assert_eq!(store.length(&session), 0);
        assert_eq!(store.mood(&session), Mood::Content);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = store();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.append_exchange(&a, "x", "y");
        store.append_exchange(&a, "x", "y");
        store.append_exchange(&b, "x", "y");
        store.reset(&a);
        assert_eq!(store.length(&a), 0);
        assert_eq!(store.length(&b), 1);
        assert_eq!(store.sessions(), vec![a, b]);
    }

    #[test]
    fn test_concurrent_readers_never_see_overflow() {
        let store = Arc::new(ConversationStore::new("P", 3, 2));
        let session = SessionId::default();

        let writer = {
            let store = Arc::clone(&store);
            let session = session.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    store.append_exchange(&session, &i.to_string(), "ok");
                    if i % 97 == 0 {
                        store.reset(&session);
                    }
                }
            })
        };

        for _ in 0..2000 {
            assert!(store.length(&session) <= 3);
        }
        writer.join().unwrap();
    }
}
