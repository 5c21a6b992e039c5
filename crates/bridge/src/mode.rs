use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a consumer and its subscribers are configured.
///
/// Use [`SubscriptionMode::SingleSubscriberStrictMessageOrder`] when messages
/// must be handled strictly in order, and
/// [`SubscriptionMode::MultipleSubscribersAllowed`] when horizontal scaling
/// matters more than order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    /// Several subscribers may pull from one consumer. Message order is not
    /// guaranteed once a message is negatively acknowledged.
    #[default]
    MultipleSubscribersAllowed,

    /// A single subscriber pulls from the consumer and retries a failed message
    /// until it is resolved. This blocks the whole consumer, so horizontal
    /// scaling is not effectively possible.
    SingleSubscriberStrictMessageOrder,
}

impl SubscriptionMode {
    /// Maximum number of unacknowledged messages the consumer may hand out.
    #[must_use]
    pub const fn max_ack_pending(self) -> Option<i64> {
        match self {
            Self::MultipleSubscribersAllowed => None,
            Self::SingleSubscriberStrictMessageOrder => Some(1),
        }
    }

    /// Whether the mode guarantees in-order delivery.
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::SingleSubscriberStrictMessageOrder)
    }
}

impl Display for SubscriptionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MultipleSubscribersAllowed => write!(f, "multiple-subscribers-allowed"),
            Self::SingleSubscriberStrictMessageOrder => {
                write!(f, "single-subscriber-strict-message-order")
            }
        }
    }
}
