use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{broadcast, Notify};

use gatehouse::config::IntakeConfig;
use gatehouse::workflows::intake::{
    Answer, ApplicationId, ApplicationRecord, ApplicationRepository, ApplicationStatus, ChannelId,
    ConversationGateway, IncomingMessage, MessageSubscription, OutboundMessage, ProvisioningSink,
    QuestionKey, RepositoryError, RetryPolicy, RoleId, Submission, TransportError,
    TriggerResponder, UserId,
};

/// Fixed identifiers for local (demo and test) wiring; the serve path loads
/// the real ones from the environment instead.
pub(crate) fn demo_intake_config() -> IntakeConfig {
    IntakeConfig {
        entry_channel: ChannelId("entry".to_string()),
        review_channel: ChannelId("review".to_string()),
        approved_channel: ChannelId("approved".to_string()),
        rejected_channel: ChannelId("rejected".to_string()),
        provisioning_channel: ChannelId("provisioning".to_string()),
        staff_role: RoleId("staff".to_string()),
        approved_role: RoleId("citizen".to_string()),
        answer_timeout: Duration::from_secs(300),
        reason_timeout: Duration::from_secs(120),
        retry: RetryPolicy::default(),
    }
}

pub(crate) fn demo_submission(applicant: &str) -> Submission {
    let answers = [
        (QuestionKey::CharacterName, "Ana Souza"),
        (QuestionKey::CharacterAge, "27"),
        (QuestionKey::AccessSecret, "pw1"),
        (QuestionKey::Backstory, "Grew up at the docks."),
        (QuestionKey::SteamId, "STEAM_0:1:4791"),
        (QuestionKey::Referral, "A friend's invite"),
    ];
    Submission {
        applicant: UserId(applicant.to_string()),
        answers: answers
            .into_iter()
            .map(|(key, text)| Answer {
                key,
                text: text.to_string(),
            })
            .collect(),
        submitted_at: Utc::now(),
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct PlatformState {
    senders: HashMap<ChannelId, broadcast::Sender<IncomingMessage>>,
    transcripts: HashMap<ChannelId, Vec<OutboundMessage>>,
    deleted: Vec<ChannelId>,
    granted: Vec<(UserId, RoleId)>,
}

/// In-memory stand-in for the chat platform. Carries per-channel broadcast
/// feeds so collectors behave exactly as they would against a live client.
#[derive(Default)]
pub(crate) struct InMemoryPlatform {
    state: Mutex<PlatformState>,
    notify: Notify,
    next_channel: AtomicU64,
}

impl InMemoryPlatform {
    fn sender(&self, channel: &ChannelId) -> broadcast::Sender<IncomingMessage> {
        let mut state = self.state.lock().expect("platform mutex poisoned");
        state
            .senders
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Inject a participant message into a channel feed.
    pub(crate) fn say(&self, channel: &ChannelId, author: &UserId, text: &str) {
        let _ = self.sender(channel).send(IncomingMessage {
            channel: channel.clone(),
            author: author.clone(),
            text: text.to_string(),
        });
    }

    pub(crate) fn transcript(&self, channel: &ChannelId) -> Vec<OutboundMessage> {
        let state = self.state.lock().expect("platform mutex poisoned");
        state.transcripts.get(channel).cloned().unwrap_or_default()
    }

    pub(crate) fn granted_roles(&self) -> Vec<(UserId, RoleId)> {
        self.state
            .lock()
            .expect("platform mutex poisoned")
            .granted
            .clone()
    }

    /// Wait until at least `count` messages were posted to a channel.
    pub(crate) async fn wait_for_messages(&self, channel: &ChannelId, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.transcript(channel).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ConversationGateway for InMemoryPlatform {
    async fn create_applicant_channel(
        &self,
        applicant: &UserId,
        _staff_role: &RoleId,
    ) -> Result<ChannelId, TransportError> {
        let id = self.next_channel.fetch_add(1, Ordering::Relaxed) + 1;
        let channel = ChannelId(format!("intake-{id}-{applicant}"));
        self.sender(&channel);
        Ok(channel)
    }

    async fn send(
        &self,
        channel: &ChannelId,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().expect("platform mutex poisoned");
            if state.deleted.contains(channel) {
                return Err(TransportError::ChannelGone(channel.clone()));
            }
            state
                .transcripts
                .entry(channel.clone())
                .or_default()
                .push(message);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, channel: &ChannelId) -> Result<MessageSubscription, TransportError> {
        Ok(MessageSubscription::new(
            channel.clone(),
            self.sender(channel).subscribe(),
        ))
    }

    async fn delete_channel(&self, channel: &ChannelId) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("platform mutex poisoned");
        state.senders.remove(channel);
        state.deleted.push(channel.clone());
        Ok(())
    }

    async fn channel_is_empty(&self, channel: &ChannelId) -> Result<bool, TransportError> {
        Ok(self.transcript(channel).is_empty())
    }

    async fn grant_role(&self, user: &UserId, role: &RoleId) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("platform mutex poisoned");
        state.granted.push((user.clone(), role.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryApplicationRepository {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
}

impl InMemoryApplicationRepository {
    pub(crate) fn all(&self) -> Vec<ApplicationRecord> {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.records.lock().expect("repository mutex poisoned");
        if records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("repository mutex poisoned");
        if !records.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let records = self.records.lock().expect("repository mutex poisoned");
        Ok(records.get(id).cloned())
    }

    async fn pending_for(
        &self,
        applicant: &UserId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self.records.lock().expect("repository mutex poisoned");
        Ok(records
            .values()
            .filter(|record| {
                record.applicant == *applicant && record.status == ApplicationStatus::Pending
            })
            .cloned()
            .collect())
    }
}

/// Forwards provisioning commands into the configured relay channel, the way
/// the live deployment relays them to the game-server console bridge.
pub(crate) struct ChannelCommandSink {
    platform: Arc<InMemoryPlatform>,
    channel: ChannelId,
}

impl ChannelCommandSink {
    pub(crate) fn new(platform: Arc<InMemoryPlatform>, channel: ChannelId) -> Self {
        Self { platform, channel }
    }
}

#[async_trait]
impl ProvisioningSink for ChannelCommandSink {
    async fn send_command(&self, command: &str) -> Result<(), TransportError> {
        self.platform
            .send(&self.channel, OutboundMessage::text(command))
            .await
    }
}

/// Records trigger replies; used by the demo and by route tests.
#[derive(Default, Clone)]
pub(crate) struct RecordingResponder {
    replies: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
}

impl RecordingResponder {
    pub(crate) fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .expect("responder mutex poisoned")
            .clone()
    }

    pub(crate) async fn wait_for_replies(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.replies().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TriggerResponder for RecordingResponder {
    async fn ack(&self, note: &str) -> Result<(), TransportError> {
        self.replies
            .lock()
            .expect("responder mutex poisoned")
            .push(note.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn follow_up(&self, note: &str) -> Result<(), TransportError> {
        self.replies
            .lock()
            .expect("responder mutex poisoned")
            .push(note.to_string());
        self.notify.notify_waiters();
        Ok(())
    }
}
