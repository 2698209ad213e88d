use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::domain::UserId;
use super::gateway::{IncomingMessage, MessageSubscription};

/// How a reply wait ended.
#[derive(Debug)]
pub enum CollectOutcome {
    /// First qualifying message, consumed from the channel feed.
    Reply(IncomingMessage),
    /// The deadline elapsed without a qualifying message.
    TimedOut,
    /// Cancelled through the handle returned by [`ReplyCollector::cancel_handle`].
    Cancelled,
    /// The observed channel went away while waiting.
    Closed,
}

/// Waits for the next qualifying reply in a channel, bounded by a deadline.
///
/// `collect_from` consumes the collector, so a wait can resolve at most once;
/// the subscription is dropped on every outcome, which is what unsubscribes.
/// An explicit cancel handle covers external teardown (the engine never needs
/// it today, but session abort hooks attach here without structural change).
pub struct ReplyCollector {
    subscription: MessageSubscription,
    deadline: Duration,
    cancel: CancellationToken,
}

impl ReplyCollector {
    pub fn new(subscription: MessageSubscription, deadline: Duration) -> Self {
        Self {
            subscription,
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that cancels this collector from outside the waiting task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve with the first message authored by `author`. Messages from
    /// other participants are observed and discarded without consuming the
    /// wait.
    pub async fn collect_from(mut self, author: &UserId) -> CollectOutcome {
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return CollectOutcome::Cancelled,
                () = &mut deadline => return CollectOutcome::TimedOut,
                received = self.subscription.receiver.recv() => match received {
                    Ok(message) if message.author == *author => {
                        return CollectOutcome::Reply(message);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            channel = %self.subscription.channel,
                            skipped,
                            "collector lagged behind channel traffic"
                        );
                        continue;
                    }
                    Err(RecvError::Closed) => return CollectOutcome::Closed,
                },
            }
        }
    }
}
