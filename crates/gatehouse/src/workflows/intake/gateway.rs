use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::domain::{ChannelId, RoleId, UserId};

/// Errors surfaced by the chat-platform adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel {0} is gone")]
    ChannelGone(ChannelId),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("denied by platform: {0}")]
    Denied(String),
}

/// Message observed in a conversation channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: ChannelId,
    pub author: UserId,
    pub text: String,
}

/// An action control attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub id: ActionId,
    pub label: String,
}

/// Structured content handed to the platform adapter. How it is rendered
/// (plain text, embed, rich card) is the adapter's business.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub body: String,
    pub fields: Vec<(String, String)>,
    pub actions: Vec<ActionButton>,
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionButton>) -> Self {
        self.actions = actions;
        self
    }
}

/// Identifier round-tripped through the platform's component custom-id slot.
/// Decisions carry the applicant the review posting was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionId {
    StartIntake,
    Approve(UserId),
    Reject(UserId),
}

impl ActionId {
    pub fn encode(&self) -> String {
        match self {
            ActionId::StartIntake => "intake:start".to_string(),
            ActionId::Approve(applicant) => format!("intake:approve:{}", applicant.0),
            ActionId::Reject(applicant) => format!("intake:reject:{}", applicant.0),
        }
    }

    pub fn decode(raw: &str) -> Option<Self> {
        if raw == "intake:start" {
            return Some(ActionId::StartIntake);
        }
        if let Some(applicant) = raw.strip_prefix("intake:approve:") {
            if applicant.is_empty() {
                return None;
            }
            return Some(ActionId::Approve(UserId(applicant.to_string())));
        }
        if let Some(applicant) = raw.strip_prefix("intake:reject:") {
            if applicant.is_empty() {
                return None;
            }
            return Some(ActionId::Reject(UserId(applicant.to_string())));
        }
        None
    }
}

/// Live feed of new messages for a single channel. Dropping the subscription
/// stops observation; the collector consumes it for exactly one wait.
#[derive(Debug)]
pub struct MessageSubscription {
    pub(crate) channel: ChannelId,
    pub(crate) receiver: broadcast::Receiver<IncomingMessage>,
}

impl MessageSubscription {
    pub fn new(channel: ChannelId, receiver: broadcast::Receiver<IncomingMessage>) -> Self {
        Self { channel, receiver }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }
}

/// Chat-platform surface the workflow engine drives. Implementations live
/// outside the core (a real client adapter, or in-memory doubles).
#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// Create the applicant's private intake channel, visible only to the
    /// applicant and the staff role.
    async fn create_applicant_channel(
        &self,
        applicant: &UserId,
        staff_role: &RoleId,
    ) -> Result<ChannelId, TransportError>;

    async fn send(
        &self,
        channel: &ChannelId,
        message: OutboundMessage,
    ) -> Result<(), TransportError>;

    /// Begin observing new messages in a channel.
    async fn subscribe(&self, channel: &ChannelId) -> Result<MessageSubscription, TransportError>;

    /// Best effort; callers log failures instead of propagating them.
    async fn delete_channel(&self, channel: &ChannelId) -> Result<(), TransportError>;

    /// Whether a channel has no messages yet. Backs the entry-prompt guard.
    async fn channel_is_empty(&self, channel: &ChannelId) -> Result<bool, TransportError>;

    /// Best effort role grant for approved applicants.
    async fn grant_role(&self, user: &UserId, role: &RoleId) -> Result<(), TransportError>;
}

/// One-way sink forwarding provisioning commands to the game-server
/// administration layer. Fire and forget; no acknowledgment is expected.
#[async_trait]
pub trait ProvisioningSink: Send + Sync {
    async fn send_command(&self, command: &str) -> Result<(), TransportError>;
}

/// Reply surface for a single triggering action.
#[async_trait]
pub trait TriggerResponder: Send + Sync {
    async fn ack(&self, note: &str) -> Result<(), TransportError>;
    async fn follow_up(&self, note: &str) -> Result<(), TransportError>;
}

/// A triggering action received from the platform. The platform requires
/// exactly one acknowledgment per trigger, before any other reply; `respond`
/// tracks that and downgrades later calls to follow-ups.
pub struct ActionTrigger {
    pub action: ActionId,
    pub actor: UserId,
    /// Channel the trigger arrived in (the review channel for decisions).
    pub channel: ChannelId,
    responder: Box<dyn TriggerResponder>,
    acked: AtomicBool,
}

impl ActionTrigger {
    pub fn new(
        action: ActionId,
        actor: UserId,
        channel: ChannelId,
        responder: Box<dyn TriggerResponder>,
    ) -> Self {
        Self {
            action,
            actor,
            channel,
            responder,
            acked: AtomicBool::new(false),
        }
    }

    /// First call acknowledges the trigger; later calls follow up.
    pub async fn respond(&self, note: &str) -> Result<(), TransportError> {
        if self.acked.swap(true, Ordering::AcqRel) {
            self.responder.follow_up(note).await
        } else {
            self.responder.ack(note).await
        }
    }

    pub fn has_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ActionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTrigger")
            .field("action", &self.action)
            .field("actor", &self.actor)
            .field("channel", &self.channel)
            .field("acked", &self.has_acked())
            .finish()
    }
}
