//! Bounded conversation history.
//!
//! Each conversation id maps to an ordered list of role-tagged messages whose
//! cumulative character count never exceeds the configured budget. When an
//! `add` pushes a conversation over budget, the oldest messages are evicted
//! first, which can include the message that was just added.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default character budget for one conversation.
pub const DEFAULT_CONTEXT_BUDGET: usize = 11_000;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message of a conversation, in the shape both chat transports send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// `image` when `content` is a base64 image, absent for text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_type: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A user message carrying base64 image data.
    pub fn image(base64_image: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: base64_image.into(),
            content_type: Some("image".to_string()),
        }
    }

    /// Length counted against the context budget.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Storage for conversation histories.
///
/// Implementations must serialize concurrent `add` calls for the same id and
/// must not block `add` calls for different ids on each other.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Append a message and evict the oldest ones until within budget.
    async fn add(&self, conversation_id: &str, role: Role, content: &str);

    /// Retained messages in insertion order.
    async fn get(&self, conversation_id: &str) -> Vec<ChatMessage>;

    /// Drop the conversation entirely.
    async fn clear(&self, conversation_id: &str);

    /// Number of retained messages.
    async fn len(&self, conversation_id: &str) -> usize;

    /// Cumulative character count of the retained messages.
    async fn total_chars(&self, conversation_id: &str) -> usize;
}

#[derive(Debug, Default)]
struct Conversation {
    messages: VecDeque<ChatMessage>,
    total_chars: usize,
}

impl Conversation {
    fn push(&mut self, message: ChatMessage, budget: usize) -> usize {
        self.total_chars += message.char_len();
        self.messages.push_back(message);

        let mut evicted = 0;
        while self.total_chars > budget {
            match self.messages.pop_front() {
                Some(old) => {
                    self.total_chars -= old.char_len();
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Process-local [`ContextStore`] with one lock per conversation.
pub struct InMemoryContextStore {
    budget: usize,
    conversations: DashMap<String, Arc<Mutex<Conversation>>>,
}

impl InMemoryContextStore {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            conversations: DashMap::new(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    fn entry(&self, conversation_id: &str) -> Arc<Mutex<Conversation>> {
        // Clone the Arc out so the map shard lock is released before locking the conversation.
        if let Some(existing) = self.conversations.get(conversation_id) {
            return existing.clone();
        }
        self.conversations
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, conversation_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.get(conversation_id).map(|c| c.clone())
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_BUDGET)
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn add(&self, conversation_id: &str, role: Role, content: &str) {
        let conversation = self.entry(conversation_id);
        let mut guard = conversation.lock();
        let evicted = guard.push(ChatMessage::new(role, content), self.budget);
        if evicted > 0 {
            debug!(
                "Evicted {} message(s) from conversation {} ({} chars retained)",
                evicted, conversation_id, guard.total_chars
            );
        }
    }

    async fn get(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.existing(conversation_id)
            .map(|c| c.lock().messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn clear(&self, conversation_id: &str) {
        self.conversations.remove(conversation_id);
    }

    async fn len(&self, conversation_id: &str) -> usize {
        self.existing(conversation_id)
            .map(|c| c.lock().messages.len())
            .unwrap_or(0)
    }

    async fn total_chars(&self, conversation_id: &str) -> usize {
        self.existing(conversation_id)
            .map(|c| c.lock().total_chars)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_two_large_messages_keep_only_second() {
        let store = InMemoryContextStore::new(11_000);
        store.add("c", Role::User, &"a".repeat(6000)).await;
        store.add("c", Role::Assistant, &"b".repeat(6000)).await;

        let messages = store.get("c").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(store.total_chars("c").await, 6000);
    }

    #[tokio::test]
    async fn test_budget_holds_after_every_add() {
        let store = InMemoryContextStore::new(100);
        let lengths = [10usize, 40, 30, 25, 70, 5, 99, 1, 0, 60];
        for (i, len) in lengths.iter().enumerate() {
            store.add("c", Role::User, &format!("{}", i % 10).repeat(*len)).await;
            assert!(store.total_chars("c").await <= 100);
        }
    }

    #[tokio::test]
    async fn test_get_returns_retained_in_insertion_order() {
        let store = InMemoryContextStore::new(10);
        for text in ["aaaa", "bbbb", "cccc", "dd"] {
            store.add("c", Role::User, text).await;
        }
        let contents: Vec<String> = store.get("c").await.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["bbbb", "cccc", "dd"]);
    }

    #[tokio::test]
    async fn test_oversized_message_evicts_itself() {
        let store = InMemoryContextStore::new(5);
        store.add("c", Role::User, "abc").await;
        store.add("c", Role::User, "0123456789").await;
        assert_eq!(store.len("c").await, 0);
        assert_eq!(store.total_chars("c").await, 0);
    }

    #[tokio::test]
    async fn test_budget_counts_characters_not_bytes() {
        let store = InMemoryContextStore::new(4);
        store.add("c", Role::User, "你好世界").await;
        assert_eq!(store.len("c").await, 1);
        assert_eq!(store.total_chars("c").await, 4);
    }

    #[tokio::test]
    async fn test_conversations_are_independent_and_clearable() {
        let store = InMemoryContextStore::default();
        store.add("a", Role::User, "hello").await;
        store.add("b", Role::User, "world").await;
        store.clear("a").await;

        assert!(store.get("a").await.is_empty());
        assert_eq!(store.get("b").await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_locked_conversation_does_not_block_others() {
        let store = Arc::new(InMemoryContextStore::new(1_000));
        store.add("busy", Role::User, "hello").await;

        let busy = store.entry("busy");
        let _guard = busy.lock();

        let other = store.clone();
        let add = tokio::spawn(async move {
            other.add("free", Role::User, "still served").await;
            other.len("free").await
        });
        let len = tokio::time::timeout(std::time::Duration::from_secs(2), add)
            .await
            .expect("add on another conversation blocked")
            .unwrap();
        assert_eq!(len, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_same_conversation() {
        let store = Arc::new(InMemoryContextStore::new(1_000_000));
        let mut handles = Vec::new();
        for task in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    store.add("shared", Role::User, &format!("{task}-{i}")).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len("shared").await, 400);
        // Per-task ordering is preserved
        let messages = store.get("shared").await;
        for task in 0..8 {
            let indices: Vec<usize> = messages
                .iter()
                .filter_map(|m| m.content.strip_prefix(&format!("{task}-")))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(indices, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));

        let json = serde_json::to_value(ChatMessage::image("aGk=")).unwrap();
        assert_eq!(json["content_type"], "image");
    }
}
