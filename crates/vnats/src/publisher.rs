use crate::Error;

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use bytes::Bytes;
use tracing::instrument;
use vnats_bridge::subject;
use vnats_bridge::{Bridge, Logger};

/// Publishes into one stream, deduplicated by a caller-supplied key.
///
/// Publishers hold no state beyond their stream name; every call is one
/// attempted send and idempotence is left to the backend's duplicate window.
pub struct Publisher<B>
where
    B: Bridge,
{
    bridge: Arc<B>,
    logger: Logger,
    stream_name: String,
}

impl<B> Clone for Publisher<B>
where
    B: Bridge,
{
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
            logger: self.logger.clone(),
            stream_name: self.stream_name.clone(),
        }
    }
}

impl<B> Debug for Publisher<B>
where
    B: Bridge,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Publisher")
            .field("stream_name", &self.stream_name)
            .finish_non_exhaustive()
    }
}

impl<B> Publisher<B>
where
    B: Bridge,
{
    pub(crate) const fn new(bridge: Arc<B>, logger: Logger, stream_name: String) -> Self {
        Self {
            bridge,
            logger,
            stream_name,
        }
    }

    /// The stream this publisher writes to.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Publishes `payload` to `subject`, tagged with `dedup_key`.
    ///
    /// Publishing the same key twice within the stream's duplicate window
    /// stores the message once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubject`] for a malformed or wildcard subject,
    /// [`Error::SubjectNotInStream`] if the subject's first token is not the
    /// publisher's stream and [`Error::Publish`] if the bridge rejects the
    /// message, including after the connection has been closed.
    #[instrument(skip(self, payload), fields(stream = %self.stream_name))]
    pub async fn publish(
        &self,
        subject: &str,
        payload: impl Into<Bytes> + Send,
        dedup_key: &str,
    ) -> Result<(), Error<B::Error>> {
        subject::validate_concrete(subject)?;

        if subject::stream_name(subject)? != self.stream_name {
            return Err(Error::SubjectNotInStream {
                subject: subject.to_string(),
                stream: self.stream_name.clone(),
            });
        }

        let ack = self
            .bridge
            .publish(subject, payload.into(), dedup_key)
            .await
            .map_err(|source| Error::Publish {
                subject: subject.to_string(),
                source,
            })?;

        if ack.duplicate {
            self.logger.debug(format_args!(
                "Publish to {subject} with key {dedup_key} was a duplicate of message {}",
                ack.sequence
            ));
        } else {
            self.logger.trace(format_args!(
                "Published message {} to {subject}",
                ack.sequence
            ));
        }

        Ok(())
    }
}
