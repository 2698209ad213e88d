use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{ApplicationId, ChannelId, Submission};
use super::gateway::{
    ActionButton, ActionId, ConversationGateway, OutboundMessage, TransportError,
};
use super::repository::{ApplicationRecord, ApplicationRepository, ApplicationStore};

/// Where a compiled submission was posted for staff review.
#[derive(Debug, Clone)]
pub struct ReviewPosting {
    pub channel: ChannelId,
    pub application: ApplicationId,
}

/// Publishes completed submissions to the staff review channel and persists
/// them for decision lookup. Callers invoke `dispatch` at most once per
/// session.
pub struct ReviewDispatcher<G, R> {
    gateway: Arc<G>,
    store: ApplicationStore<R>,
    review_channel: ChannelId,
}

impl<G, R> ReviewDispatcher<G, R>
where
    G: ConversationGateway,
    R: ApplicationRepository,
{
    pub fn new(gateway: Arc<G>, store: ApplicationStore<R>, review_channel: ChannelId) -> Self {
        Self {
            gateway,
            store,
            review_channel,
        }
    }

    /// Persist the submission as pending, then post it for review. The
    /// posting carries the full answer set, so a store outage degrades
    /// durability without blocking staff action; the record is recovered by
    /// hand from the posting in that case.
    pub async fn dispatch(&self, submission: &Submission) -> Result<ReviewPosting, TransportError> {
        let record = ApplicationRecord::from_submission(submission, Some(self.review_channel.clone()));
        let application = record.id.clone();

        if let Err(err) = self.store.create(record).await {
            warn!(
                %application,
                applicant = %submission.applicant,
                error = %err,
                "storing application failed; continuing with review posting"
            );
        }

        self.gateway
            .send(&self.review_channel, review_message(submission))
            .await?;

        info!(
            %application,
            applicant = %submission.applicant,
            channel = %self.review_channel,
            "submission posted for review"
        );

        Ok(ReviewPosting {
            channel: self.review_channel.clone(),
            application,
        })
    }
}

fn review_message(submission: &Submission) -> OutboundMessage {
    let fields = submission
        .answers
        .iter()
        .map(|answer| (answer.key.label().to_string(), answer.text.clone()))
        .collect();

    OutboundMessage::text(format!(
        "New application received\nPlayer: {} ({})\nSubmitted at {}",
        submission.display_name(),
        submission.applicant,
        submission.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ))
    .with_fields(fields)
    .with_actions(vec![
        ActionButton {
            id: ActionId::Approve(submission.applicant.clone()),
            label: "Approve".to_string(),
        },
        ActionButton {
            id: ActionId::Reject(submission.applicant.clone()),
            label: "Reject".to_string(),
        },
    ])
}
