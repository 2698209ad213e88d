//! Applicant intake: session-driven questionnaire collection, staff review
//! hand-off, and the approve/reject decision flow.
//!
//! Each live session exclusively owns one private conversation channel and at
//! most one reply collector; sessions for different applicants share no
//! mutable state. The record store is the only resource shared between the
//! review dispatcher (writer) and the decision processor (reader + writer),
//! and the decision flow treats "not found" and "already terminal" as valid
//! racing outcomes rather than errors.

pub mod collector;
pub mod decision;
pub mod domain;
pub mod gateway;
pub mod repository;
pub mod review;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use collector::{CollectOutcome, ReplyCollector};
pub use decision::{DecisionOutcome, DecisionProcessor};
pub use domain::{
    Answer, ApplicationId, ApplicationStatus, ChannelId, Question, QuestionKey, Questionnaire,
    RoleId, Submission, UserId,
};
pub use gateway::{
    ActionButton, ActionId, ActionTrigger, ConversationGateway, IncomingMessage,
    MessageSubscription, OutboundMessage, ProvisioningSink, TransportError, TriggerResponder,
};
pub use repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView, ApplicationStore,
    RepositoryError, RetryPolicy,
};
pub use review::{ReviewDispatcher, ReviewPosting};
pub use service::IntakeService;
pub use session::{IntakeSession, SessionEnd};
