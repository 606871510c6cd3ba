//! Dummy LLM provider for offline runs and tests.
//!
//! Replies come from a script (one per call, last one repeats), a fixed
//! reply, or echo the user prompt prefixed with `[echo]`.

use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::llm::ProviderError;

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    replies: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<AtomicUsize>,
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self::scripted([reply.into()])
    }

    pub fn scripted(replies: impl IntoIterator<Item = String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn complete(&self, _system: &str, user: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| ProviderError::Request("dummy reply queue poisoned".into()))?;
        let reply = match replies.len() {
            0 => format!("[echo] {user}"),
            1 => replies[0].clone(),
            _ => replies.pop_front().unwrap_or_default(),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_prefixes_user_prompt() {
        let p = DummyProvider::echo();
        assert_eq!(p.complete("system", "hello").await.unwrap(), "[echo] hello");
    }

    #[tokio::test]
    async fn fixed_reply_repeats() {
        let p = DummyProvider::with_reply("OUT_OF_SCOPE");
        assert_eq!(p.complete("", "a").await.unwrap(), "OUT_OF_SCOPE");
        assert_eq!(p.complete("", "b").await.unwrap(), "OUT_OF_SCOPE");
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn script_is_consumed_in_order() {
        let p = DummyProvider::scripted(["one".to_string(), "two".to_string()]);
        assert_eq!(p.complete("", "").await.unwrap(), "one");
        assert_eq!(p.complete("", "").await.unwrap(), "two");
        assert_eq!(p.complete("", "").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn clones_share_call_count() {
        let p = DummyProvider::echo();
        let q = p.clone();
        q.complete("", "x").await.unwrap();
        assert_eq!(p.calls(), 1);
    }
}
