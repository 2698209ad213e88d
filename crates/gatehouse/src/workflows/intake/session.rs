use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::collector::{CollectOutcome, ReplyCollector};
use super::domain::{Answer, ChannelId, Question, Questionnaire, RoleId, Submission, UserId};
use super::gateway::{ActionTrigger, ConversationGateway, OutboundMessage, TransportError};
use super::repository::ApplicationRepository;
use super::review::ReviewDispatcher;

/// Delay between the submission confirmation and channel teardown, so the
/// applicant sees the confirmation before the channel disappears.
const TEARDOWN_GRACE: Duration = Duration::from_secs(8);

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// All answers collected and handed to review.
    Submitted(Submission),
    /// The applicant missed the answer deadline at the given question index.
    Expired { at_question: usize },
    /// The conversation channel became unusable mid-flow; no record created.
    Abandoned,
}

/// One applicant's live intake run. The session exclusively owns its private
/// conversation channel from creation to teardown and never holds more than
/// one reply collector at a time.
pub struct IntakeSession<G> {
    gateway: Arc<G>,
    questionnaire: Arc<Questionnaire>,
    applicant: UserId,
    channel: ChannelId,
    answer_deadline: Duration,
}

impl<G: ConversationGateway> IntakeSession<G> {
    /// Create the applicant's private channel and acknowledge the trigger.
    /// The acknowledgment is the first reply sent for the trigger.
    pub async fn open(
        gateway: Arc<G>,
        questionnaire: Arc<Questionnaire>,
        trigger: &ActionTrigger,
        staff_role: &RoleId,
        answer_deadline: Duration,
    ) -> Result<Self, TransportError> {
        let channel = gateway
            .create_applicant_channel(&trigger.actor, staff_role)
            .await?;
        trigger
            .respond(&format!("Private intake channel created: #{channel}"))
            .await?;
        info!(applicant = %trigger.actor, %channel, "intake session opened");

        Ok(Self {
            gateway,
            questionnaire,
            applicant: trigger.actor.clone(),
            channel,
            answer_deadline,
        })
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Drive the question loop to completion or teardown. A submitted
    /// session carries exactly one answer per question, in question order,
    /// and is dispatched to review exactly once.
    pub async fn run<R>(self, dispatcher: &ReviewDispatcher<G, R>) -> SessionEnd
    where
        R: ApplicationRepository,
    {
        let greeting = OutboundMessage::text(
            "Welcome! Let's get your application going. Answer each question \
             below in this channel.",
        );
        if let Err(err) = self.gateway.send(&self.channel, greeting).await {
            return self.abandon(err).await;
        }

        let questionnaire = self.questionnaire.clone();
        let total = questionnaire.len();
        let mut answers = Vec::with_capacity(total);

        for (index, question) in questionnaire.iter().enumerate() {
            // Subscribe before prompting so a fast reply cannot slip past the
            // collector.
            let subscription = match self.gateway.subscribe(&self.channel).await {
                Ok(subscription) => subscription,
                Err(err) => return self.abandon(err).await,
            };

            let prompt = question_prompt(question, index, total);
            if let Err(err) = self.gateway.send(&self.channel, prompt).await {
                return self.abandon(err).await;
            }

            let collector = ReplyCollector::new(subscription, self.answer_deadline);
            match collector.collect_from(&self.applicant).await {
                CollectOutcome::Reply(message) => {
                    answers.push(Answer {
                        key: question.key,
                        text: message.text,
                    });
                }
                CollectOutcome::TimedOut => return self.expire(index).await,
                CollectOutcome::Cancelled | CollectOutcome::Closed => {
                    warn!(
                        applicant = %self.applicant,
                        channel = %self.channel,
                        question = index,
                        "conversation channel unusable mid-flow; abandoning session"
                    );
                    return SessionEnd::Abandoned;
                }
            }
        }

        let submission = Submission {
            applicant: self.applicant.clone(),
            answers,
            submitted_at: Utc::now(),
        };

        if let Err(err) = dispatcher.dispatch(&submission).await {
            warn!(
                applicant = %self.applicant,
                error = %err,
                "review hand-off failed; abandoning session"
            );
            let notice = OutboundMessage::text(
                "Something went wrong submitting your application. Please try \
                 again later.",
            );
            let _ = self.gateway.send(&self.channel, notice).await;
            self.teardown().await;
            return SessionEnd::Abandoned;
        }

        let confirmation = OutboundMessage::text(
            "Application submitted! The staff team will review it shortly.",
        );
        if let Err(err) = self.gateway.send(&self.channel, confirmation).await {
            warn!(channel = %self.channel, error = %err, "submission confirmation failed");
        }

        tokio::time::sleep(TEARDOWN_GRACE).await;
        self.teardown().await;
        info!(applicant = %self.applicant, "intake session completed");
        SessionEnd::Submitted(submission)
    }

    async fn expire(self, at_question: usize) -> SessionEnd {
        let notice = OutboundMessage::text(
            "Time's up. Start a new application from the entry channel if you \
             want to try again.",
        );
        if let Err(err) = self.gateway.send(&self.channel, notice).await {
            warn!(channel = %self.channel, error = %err, "timeout notice failed");
        }
        self.teardown().await;
        info!(
            applicant = %self.applicant,
            question = at_question,
            "intake session expired without an answer"
        );
        SessionEnd::Expired { at_question }
    }

    async fn abandon(self, err: TransportError) -> SessionEnd {
        warn!(
            applicant = %self.applicant,
            channel = %self.channel,
            error = %err,
            "session transport failed; abandoning"
        );
        self.teardown().await;
        SessionEnd::Abandoned
    }

    async fn teardown(&self) {
        if let Err(err) = self.gateway.delete_channel(&self.channel).await {
            warn!(channel = %self.channel, error = %err, "channel deletion failed");
        }
    }
}

fn question_prompt(question: &Question, index: usize, total: usize) -> OutboundMessage {
    OutboundMessage::text(format!(
        "{}\n{}\n\nQuestion {} of {}",
        question.key.label(),
        question.detail,
        index + 1,
        total
    ))
}
