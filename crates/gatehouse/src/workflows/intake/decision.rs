use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::IntakeConfig;

use super::collector::{CollectOutcome, ReplyCollector};
use super::domain::{ApplicationStatus, QuestionKey, UserId};
use super::gateway::{
    ActionTrigger, ConversationGateway, OutboundMessage, ProvisioningSink, TransportError,
};
use super::repository::{ApplicationRecord, ApplicationRepository, ApplicationStore};

/// Result of handling one approve/reject action.
#[derive(Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Rejected,
    /// No pending record for the applicant: already decided, or never stored.
    NothingPending,
    /// Reject ended without a reason before the deadline; record unchanged.
    ReasonTimedOut,
    /// The record store could not be reached for the pending lookup.
    StoreUnavailable,
}

/// Turns staff approve/reject actions into terminal state transitions plus
/// side effects.
///
/// Transitions: `pending --approve--> approved` and
/// `pending --reject--> rejected` (the latter only together with a captured
/// reason). Decisions for the same applicant are serialized through a keyed
/// lock, so a racing second action observes the terminal state and gets the
/// "already decided" reply instead of re-running side effects.
pub struct DecisionProcessor<G, R, S> {
    gateway: Arc<G>,
    store: ApplicationStore<R>,
    sink: Arc<S>,
    config: IntakeConfig,
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<G, R, S> DecisionProcessor<G, R, S>
where
    G: ConversationGateway,
    R: ApplicationRepository,
    S: ProvisioningSink,
{
    pub fn new(
        gateway: Arc<G>,
        store: ApplicationStore<R>,
        sink: Arc<S>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            sink,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, applicant: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("decision lock map poisoned");
        locks
            .entry(applicant.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn load_pending(
        &self,
        trigger: &ActionTrigger,
        applicant: &UserId,
    ) -> Result<Result<ApplicationRecord, DecisionOutcome>, TransportError> {
        match self.store.find_pending(applicant).await {
            Ok(Some(record)) => Ok(Ok(record)),
            Ok(None) => {
                trigger
                    .respond("This application was already decided or is missing.")
                    .await?;
                Ok(Err(DecisionOutcome::NothingPending))
            }
            Err(err) => {
                warn!(%applicant, error = %err, "pending lookup failed");
                trigger
                    .respond("The application store is unavailable right now; try again shortly.")
                    .await?;
                Ok(Err(DecisionOutcome::StoreUnavailable))
            }
        }
    }

    /// Approve the applicant's pending application: grant the approved role,
    /// announce, emit the provisioning command, then commit the terminal
    /// transition.
    pub async fn approve(
        &self,
        trigger: &ActionTrigger,
        applicant: &UserId,
    ) -> Result<DecisionOutcome, TransportError> {
        let lock = self.lock_for(applicant);
        let _serialized = lock.lock().await;

        let mut record = match self.load_pending(trigger, applicant).await? {
            Ok(record) => record,
            Err(outcome) => return Ok(outcome),
        };

        // Side effects fire before the terminal write and are not rolled back
        // if that write later fails; the review posting stays the operator's
        // recovery point. See DESIGN.md.
        if let Err(err) = self
            .gateway
            .grant_role(applicant, &self.config.approved_role)
            .await
        {
            warn!(%applicant, error = %err, "approved-role grant failed");
        }

        let notice = approval_notice(applicant, &record.display_name);
        if let Err(err) = self
            .gateway
            .send(&self.config.approved_channel, notice)
            .await
        {
            warn!(%applicant, error = %err, "approval announcement failed");
        }

        let secret = record.answer(QuestionKey::AccessSecret).unwrap_or("unset");
        let command = format!("adduser nick:{} secret:{}", record.display_name, secret);
        if let Err(err) = self.sink.send_command(&command).await {
            warn!(%applicant, error = %err, "provisioning command failed");
        }

        record.status = ApplicationStatus::Approved;
        record.decided_by = Some(trigger.actor.clone());
        if let Err(err) = self.store.save(record.clone()).await {
            warn!(
                id = %record.id,
                %applicant,
                error = %err,
                "terminal status write failed after side effects; record needs manual reconciliation"
            );
        }

        trigger.respond("Application approved.").await?;
        info!(%applicant, staff = %trigger.actor, id = %record.id, "application approved");
        Ok(DecisionOutcome::Approved)
    }

    /// Reject the applicant's pending application. The terminal transition
    /// commits only together with a captured reason; a reason timeout leaves
    /// the record pending so the action can be retried.
    pub async fn reject(
        &self,
        trigger: &ActionTrigger,
        applicant: &UserId,
    ) -> Result<DecisionOutcome, TransportError> {
        let lock = self.lock_for(applicant);
        let _serialized = lock.lock().await;

        let mut record = match self.load_pending(trigger, applicant).await? {
            Ok(record) => record,
            Err(outcome) => return Ok(outcome),
        };

        // Subscribe before prompting so the staff reply cannot slip past the
        // collector.
        let subscription = self.gateway.subscribe(&trigger.channel).await?;

        let minutes = self.config.reason_timeout.as_secs() / 60;
        trigger
            .respond(&format!(
                "Reply with the rejection reason (you have {minutes} minutes)."
            ))
            .await?;

        let collector = ReplyCollector::new(subscription, self.config.reason_timeout);

        match collector.collect_from(&trigger.actor).await {
            CollectOutcome::Reply(message) => {
                let reason = message.text;

                let notice = rejection_notice(applicant, &reason);
                if let Err(err) = self
                    .gateway
                    .send(&self.config.rejected_channel, notice)
                    .await
                {
                    warn!(%applicant, error = %err, "rejection announcement failed");
                }

                record.status = ApplicationStatus::Rejected;
                record.decided_by = Some(trigger.actor.clone());
                record.rejection_reason = Some(reason);
                if let Err(err) = self.store.save(record.clone()).await {
                    warn!(
                        id = %record.id,
                        %applicant,
                        error = %err,
                        "terminal status write failed after side effects; record needs manual reconciliation"
                    );
                }

                trigger
                    .respond("Application rejected; the reason was announced.")
                    .await?;
                info!(%applicant, staff = %trigger.actor, id = %record.id, "application rejected");
                Ok(DecisionOutcome::Rejected)
            }
            CollectOutcome::TimedOut => {
                trigger
                    .respond("No reason received in time; the application stays pending.")
                    .await?;
                info!(%applicant, staff = %trigger.actor, "rejection reason wait timed out");
                Ok(DecisionOutcome::ReasonTimedOut)
            }
            CollectOutcome::Cancelled | CollectOutcome::Closed => {
                trigger
                    .respond("The conversation went away before a reason arrived; the application stays pending.")
                    .await?;
                Ok(DecisionOutcome::ReasonTimedOut)
            }
        }
    }
}

fn approval_notice(applicant: &UserId, display_name: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Application approved\nPlayer: {applicant}\nCharacter: {display_name}\n\n\
         Congratulations! Your application has been approved. Welcome aboard."
    ))
}

fn rejection_notice(applicant: &UserId, reason: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Application rejected\nPlayer: {applicant}\n\n\
         Your application was rejected for: {reason}\n\
         Fix those details and apply again."
    ))
}
