use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};

use crate::config::IntakeConfig;
use crate::workflows::intake::domain::{
    Answer, ApplicationId, ApplicationStatus, ChannelId, QuestionKey, RoleId, Submission, UserId,
};
use crate::workflows::intake::gateway::{
    ActionId, ActionTrigger, ConversationGateway, IncomingMessage, MessageSubscription,
    OutboundMessage, ProvisioningSink, TransportError, TriggerResponder,
};
use crate::workflows::intake::repository::{
    ApplicationRecord, ApplicationRepository, RepositoryError, RetryPolicy,
};

pub(super) fn intake_config() -> IntakeConfig {
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

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn channel(id: &str) -> ChannelId {
    ChannelId(id.to_string())
}

pub(super) fn submission(applicant: &str) -> Submission {
    Submission {
        applicant: user(applicant),
        answers: vec![
            Answer {
                key: QuestionKey::CharacterName,
                text: "Ana Souza".to_string(),
            },
            Answer {
                key: QuestionKey::CharacterAge,
                text: "27".to_string(),
            },
            Answer {
                key: QuestionKey::AccessSecret,
                text: "pw1".to_string(),
            },
            Answer {
                key: QuestionKey::Backstory,
                text: "Grew up at the docks.".to_string(),
            },
            Answer {
                key: QuestionKey::SteamId,
                text: "STEAM_0:1:4791".to_string(),
            },
            Answer {
                key: QuestionKey::Referral,
                text: "A friend's invite".to_string(),
            },
        ],
        submitted_at: Utc::now(),
    }
}

pub(super) async fn seed_pending(
    repository: &MemoryRepository,
    applicant: &str,
) -> ApplicationRecord {
    let record = ApplicationRecord::from_submission(
        &submission(applicant),
        Some(channel("review")),
    );
    repository.insert(record).await.expect("seed record")
}

pub(super) fn trigger(
    action: ActionId,
    actor: &str,
    origin: &str,
    responder: &MemoryResponder,
) -> ActionTrigger {
    ActionTrigger::new(
        action,
        user(actor),
        channel(origin),
        Box::new(responder.clone()),
    )
}

// --- gateway double ---------------------------------------------------------

#[derive(Default)]
struct GatewayState {
    senders: HashMap<ChannelId, broadcast::Sender<IncomingMessage>>,
    /// Survives channel deletion so tests can assert on teardown notices.
    transcripts: HashMap<ChannelId, Vec<OutboundMessage>>,
    deleted: Vec<ChannelId>,
    granted: Vec<(UserId, RoleId)>,
}

/// In-memory conversation gateway with per-channel broadcast feeds and
/// injectable failures.
pub(super) struct MemoryGateway {
    state: Mutex<GatewayState>,
    notify: Notify,
    next_channel: AtomicU64,
    fail_channel_creation: AtomicBool,
    fail_role_grants: AtomicBool,
}

impl MemoryGateway {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            notify: Notify::new(),
            next_channel: AtomicU64::new(1),
            fail_channel_creation: AtomicBool::new(false),
            fail_role_grants: AtomicBool::new(false),
        }
    }

    pub(super) fn fail_channel_creation(&self) {
        self.fail_channel_creation.store(true, Ordering::Release);
    }

    pub(super) fn fail_role_grants(&self) {
        self.fail_role_grants.store(true, Ordering::Release);
    }

    fn sender(&self, channel: &ChannelId) -> Result<broadcast::Sender<IncomingMessage>, TransportError> {
        let mut state = self.state.lock().expect("gateway mutex poisoned");
        if state.deleted.contains(channel) {
            return Err(TransportError::ChannelGone(channel.clone()));
        }
        let sender = state
            .senders
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(64).0);
        Ok(sender.clone())
    }

    /// Inject a participant message into a channel feed.
    pub(super) fn say(&self, channel: &ChannelId, author: &str, text: &str) {
        let sender = self.sender(channel).expect("channel is live");
        let _ = sender.send(IncomingMessage {
            channel: channel.clone(),
            author: user(author),
            text: text.to_string(),
        });
    }

    pub(super) fn sent_to(&self, channel: &ChannelId) -> Vec<OutboundMessage> {
        let state = self.state.lock().expect("gateway mutex poisoned");
        state
            .transcripts
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub(super) fn deleted(&self) -> Vec<ChannelId> {
        self.state
            .lock()
            .expect("gateway mutex poisoned")
            .deleted
            .clone()
    }

    pub(super) fn granted_roles(&self) -> Vec<(UserId, RoleId)> {
        self.state
            .lock()
            .expect("gateway mutex poisoned")
            .granted
            .clone()
    }

    /// Wait until at least `count` messages were posted to a channel.
    pub(super) async fn wait_for_messages(&self, channel: &ChannelId, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.sent_to(channel).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ConversationGateway for MemoryGateway {
    async fn create_applicant_channel(
        &self,
        _applicant: &UserId,
        _staff_role: &RoleId,
    ) -> Result<ChannelId, TransportError> {
        if self.fail_channel_creation.load(Ordering::Acquire) {
            return Err(TransportError::Unavailable("channel quota".to_string()));
        }
        let id = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let channel = ChannelId(format!("intake-{id}"));
        self.sender(&channel)?;
        Ok(channel)
    }

    async fn send(
        &self,
        channel: &ChannelId,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().expect("gateway mutex poisoned");
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
        let sender = self.sender(channel)?;
        Ok(MessageSubscription::new(channel.clone(), sender.subscribe()))
    }

    async fn delete_channel(&self, channel: &ChannelId) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().expect("gateway mutex poisoned");
            state.senders.remove(channel);
            state.deleted.push(channel.clone());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn channel_is_empty(&self, channel: &ChannelId) -> Result<bool, TransportError> {
        Ok(self.sent_to(channel).is_empty())
    }

    async fn grant_role(&self, user: &UserId, role: &RoleId) -> Result<(), TransportError> {
        if self.fail_role_grants.load(Ordering::Acquire) {
            return Err(TransportError::Denied("missing permission".to_string()));
        }
        let mut state = self.state.lock().expect("gateway mutex poisoned");
        state.granted.push((user.clone(), role.clone()));
        Ok(())
    }
}

// --- trigger responder double -----------------------------------------------

#[derive(Default, Clone)]
pub(super) struct MemoryResponder {
    acks: Arc<Mutex<Vec<String>>>,
    follow_ups: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
}

impl MemoryResponder {
    pub(super) fn acks(&self) -> Vec<String> {
        self.acks.lock().expect("responder mutex poisoned").clone()
    }

    pub(super) fn follow_ups(&self) -> Vec<String> {
        self.follow_ups
            .lock()
            .expect("responder mutex poisoned")
            .clone()
    }

    /// Wait until the trigger received at least `count` replies of any kind.
    pub(super) async fn wait_for_replies(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.acks().len() + self.follow_ups().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TriggerResponder for MemoryResponder {
    async fn ack(&self, note: &str) -> Result<(), TransportError> {
        self.acks
            .lock()
            .expect("responder mutex poisoned")
            .push(note.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn follow_up(&self, note: &str) -> Result<(), TransportError> {
        self.follow_ups
            .lock()
            .expect("responder mutex poisoned")
            .push(note.to_string());
        self.notify.notify_waiters();
        Ok(())
    }
}

// --- repository doubles -----------------------------------------------------

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
}

#[async_trait]
impl ApplicationRepository for MemoryRepository {
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

/// Fails the first `failures` write attempts with a transient error, then
/// delegates to an inner in-memory repository. Counts every call.
pub(super) struct FlakyRepository {
    failures: AtomicU32,
    calls: AtomicU32,
    pub(super) inner: MemoryRepository,
}

impl FlakyRepository {
    pub(super) fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            inner: MemoryRepository::default(),
        }
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::Acquire)
    }

    fn outage(&self) -> Option<RepositoryError> {
        if self.failures.load(Ordering::Acquire) > 0 {
            self.failures.fetch_sub(1, Ordering::AcqRel);
            Some(RepositoryError::Unavailable("primary offline".to_string()))
        } else {
            None
        }
    }
}

#[async_trait]
impl ApplicationRepository for FlakyRepository {
    async fn insert(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if let Some(err) = self.outage() {
            return Err(err);
        }
        self.inner.insert(record).await
    }

    async fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if let Some(err) = self.outage() {
            return Err(err);
        }
        self.inner.update(record).await
    }

    async fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn pending_for(
        &self,
        applicant: &UserId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.pending_for(applicant).await
    }
}

pub(super) struct UnavailableRepository;

#[async_trait]
impl ApplicationRepository for UnavailableRepository {
    async fn insert(
        &self,
        _record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn update(&self, _record: ApplicationRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn fetch(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn pending_for(
        &self,
        _applicant: &UserId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

// --- provisioning sink double ------------------------------------------------

#[derive(Default)]
pub(super) struct RecordingSink {
    commands: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(super) fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl ProvisioningSink for RecordingSink {
    async fn send_command(&self, command: &str) -> Result<(), TransportError> {
        self.commands
            .lock()
            .expect("sink mutex poisoned")
            .push(command.to_string());
        Ok(())
    }
}
