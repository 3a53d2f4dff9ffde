//! Scriptable generation backend for tests and offline runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{GenerationBackend, GenerationError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Reply(String),
    /// Sleep, then return this text.
    Slow(Duration, String),
    /// Fail with this message.
    Fail(String),
}

/// A [`GenerationBackend`] that replays scripted replies.
///
/// With a sequence, replies are consumed in order and the last one repeats
/// once the script runs out. Never touches the network; the `client`
/// argument is ignored.
pub struct MockGenerator {
    replies: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockGenerator {
    pub fn new(reply: MockReply) -> Self {
        MockGenerator {
            replies: Mutex::new(Vec::new()),
            fallback: reply,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_sequence(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "sequence must not be empty");
        let fallback = replies[replies.len() - 1].clone();
        let mut reversed = replies;
        reversed.reverse();
        MockGenerator {
            replies: Mutex::new(reversed),
            fallback,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Adds a fixed delay before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        let mut replies = self.replies.lock().unwrap();
        replies.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl GenerationBackend for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        _system: &'a str,
        _user: &'a str,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                MockReply::Reply(text) => Ok(text),
                MockReply::Slow(extra, text) => {
                    tokio::time::sleep(extra).await;
                    Ok(text)
                }
                MockReply::Fail(message) => Err(GenerationError::Other(message)),
            }
        })
    }
}
