use std::sync::Arc;

use tracing::{error, info};

use crate::config::IntakeConfig;

use super::decision::DecisionProcessor;
use super::domain::{ApplicationId, Questionnaire, UserId};
use super::gateway::{
    ActionButton, ActionId, ActionTrigger, ConversationGateway, OutboundMessage, ProvisioningSink,
    TransportError,
};
use super::repository::{
    ApplicationRepository, ApplicationStatusView, ApplicationStore, RepositoryError,
};
use super::review::ReviewDispatcher;
use super::session::{IntakeSession, SessionEnd};

/// Facade wiring the intake workflow together: the startup entry-prompt
/// guard, session spawning, and the decision boundary.
pub struct IntakeService<G, R, S> {
    gateway: Arc<G>,
    questionnaire: Arc<Questionnaire>,
    dispatcher: Arc<ReviewDispatcher<G, R>>,
    decisions: DecisionProcessor<G, R, S>,
    store: ApplicationStore<R>,
    config: IntakeConfig,
}

impl<G, R, S> IntakeService<G, R, S>
where
    G: ConversationGateway + 'static,
    R: ApplicationRepository + 'static,
    S: ProvisioningSink + 'static,
{
    pub fn new(gateway: Arc<G>, repository: Arc<R>, sink: Arc<S>, config: IntakeConfig) -> Self {
        let store = ApplicationStore::new(repository, config.retry);
        let dispatcher = Arc::new(ReviewDispatcher::new(
            gateway.clone(),
            store.clone(),
            config.review_channel.clone(),
        ));
        let decisions =
            DecisionProcessor::new(gateway.clone(), store.clone(), sink, config.clone());

        Self {
            gateway,
            questionnaire: Arc::new(Questionnaire::standard()),
            dispatcher,
            decisions,
            store,
            config,
        }
    }

    /// Post the entry-point prompt unless the entry channel already carries
    /// one. Returns whether a prompt was posted.
    pub async fn ensure_entry_prompt(&self) -> Result<bool, TransportError> {
        if !self
            .gateway
            .channel_is_empty(&self.config.entry_channel)
            .await?
        {
            info!(channel = %self.config.entry_channel, "entry prompt already present; not reposting");
            return Ok(false);
        }

        let prompt = OutboundMessage::text(
            "Start your application\nPress the button below and a private \
             channel opens where you answer the intake questions.",
        )
        .with_actions(vec![ActionButton {
            id: ActionId::StartIntake,
            label: "Start application".to_string(),
        }]);

        self.gateway.send(&self.config.entry_channel, prompt).await?;
        info!(channel = %self.config.entry_channel, "entry prompt installed");
        Ok(true)
    }

    /// Route one triggering action. Every handler failure is caught here:
    /// logged with actor and action context, and answered with a generic
    /// notice so no trigger is left unacknowledged.
    pub async fn handle_trigger(&self, trigger: ActionTrigger) {
        let action = trigger.action.clone();
        let result = match &action {
            ActionId::StartIntake => self.start_session(&trigger).await,
            ActionId::Approve(applicant) => self
                .decisions
                .approve(&trigger, applicant)
                .await
                .map(|_| ()),
            ActionId::Reject(applicant) => {
                self.decisions.reject(&trigger, applicant).await.map(|_| ())
            }
        };

        if let Err(err) = result {
            error!(
                actor = %trigger.actor,
                action = %action.encode(),
                error = %err,
                "action handler failed"
            );
            if let Err(err) = trigger
                .respond("An error occurred processing this action.")
                .await
            {
                error!(actor = %trigger.actor, error = %err, "failure notice could not be delivered");
            }
        }
    }

    async fn start_session(&self, trigger: &ActionTrigger) -> Result<(), TransportError> {
        let session = IntakeSession::open(
            self.gateway.clone(),
            self.questionnaire.clone(),
            trigger,
            &self.config.staff_role,
            self.config.answer_timeout,
        )
        .await?;

        let applicant = trigger.actor.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            match session.run(&dispatcher).await {
                SessionEnd::Submitted(_) | SessionEnd::Expired { .. } => {}
                SessionEnd::Abandoned => {
                    info!(%applicant, "intake session ended without a submission");
                }
            }
        });

        Ok(())
    }

    /// Sanitized status view for the read endpoint.
    pub async fn application_status(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationStatusView>, RepositoryError> {
        Ok(self.store.fetch(id).await?.map(|record| record.status_view()))
    }

    /// Pending queue position check used by operational tooling.
    pub async fn pending_application(
        &self,
        applicant: &UserId,
    ) -> Result<Option<ApplicationStatusView>, RepositoryError> {
        Ok(self
            .store
            .find_pending(applicant)
            .await?
            .map(|record| record.status_view()))
    }
}
