use std::error::Error as StdError;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use vnats_bridge::Message;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure reported by a [`MessageHandler`].
///
/// The handler decides whether a message is worth retrying; the subscriber
/// never infers it.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Processing may succeed later; the message is redelivered.
    #[error("recoverable: {0}")]
    Recoverable(#[source] BoxError),

    /// Processing will never succeed; the message is dropped.
    #[error("terminal: {0}")]
    Terminal(#[source] BoxError),
}

impl HandlerError {
    /// Wraps `error` as a recoverable failure.
    pub fn recoverable(error: impl Into<BoxError>) -> Self {
        Self::Recoverable(error.into())
    }

    /// Wraps `error` as a terminal failure.
    pub fn terminal(error: impl Into<BoxError>) -> Self {
        Self::Terminal(error.into())
    }

    /// Whether the message should be redelivered.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

/// Application callback invoked once per delivered message.
#[async_trait]
pub trait MessageHandler
where
    Self: Send + Sync + 'static,
{
    /// Handles the given message.
    async fn handle(&self, message: Message) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Result<(), HandlerError> {
        self(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    fn message() -> Message {
        Message {
            subject: "ORDERS.new".to_string(),
            payload: Bytes::from("A"),
            headers: None,
            stream_sequence: 1,
            delivered: 1,
        }
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = |message: Message| async move {
            if message.payload == Bytes::from("A") {
                Ok(())
            } else {
                Err(HandlerError::terminal("unexpected payload"))
            }
        };

        assert!(handler.handle(message()).await.is_ok());
    }

    #[test]
    fn test_classification() {
        assert!(HandlerError::recoverable("try again").is_recoverable());
        assert!(!HandlerError::terminal("malformed").is_recoverable());
        assert_eq!(
            HandlerError::terminal("malformed").to_string(),
            "terminal: malformed"
        );
    }
}
