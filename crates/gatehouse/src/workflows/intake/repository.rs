use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{
    Answer, ApplicationId, ApplicationStatus, ChannelId, QuestionKey, Submission, UserId,
};

/// Persisted applicant submission and its review status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub applicant: UserId,
    pub display_name: String,
    pub answers: Vec<Answer>,
    pub status: ApplicationStatus,
    pub decided_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Where the compiled submission was posted, for audit correlation.
    pub review_location: Option<ChannelId>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl ApplicationRecord {
    /// Build a pending record from a completed submission.
    pub fn from_submission(submission: &Submission, review_location: Option<ChannelId>) -> Self {
        Self {
            id: next_application_id(),
            applicant: submission.applicant.clone(),
            display_name: submission.display_name().to_string(),
            answers: submission.answers.clone(),
            status: ApplicationStatus::Pending,
            decided_by: None,
            rejection_reason: None,
            created_at: submission.submitted_at,
            review_location,
        }
    }

    pub fn answer(&self, key: QuestionKey) -> Option<&str> {
        self.answers
            .iter()
            .find(|answer| answer.key == key)
            .map(|answer| answer.text.as_str())
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            applicant: self.applicant.clone(),
            status: self.status.label(),
            decided_by: self.decided_by.clone(),
            rejection_reason: self.rejection_reason.clone(),
            created_at: self.created_at,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub applicant: UserId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

/// Storage abstraction so the workflow can be exercised in isolation.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    async fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    async fn fetch(&self, id: &ApplicationId)
        -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// All records for the applicant still awaiting a decision.
    async fn pending_for(&self, applicant: &UserId)
        -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Bounded fixed-delay retry applied to durable writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Record-store client: wraps a repository with the write retry policy and
/// the pending-lookup tie-break.
pub struct ApplicationStore<R> {
    repository: Arc<R>,
    retry: RetryPolicy,
}

impl<R> Clone for ApplicationStore<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            retry: self.retry,
        }
    }
}

impl<R: ApplicationRepository> ApplicationStore<R> {
    pub fn new(repository: Arc<R>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }

    /// Persist a new record, retrying transient failures.
    pub async fn create(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.repository.insert(record.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    warn!(id = %record.id, attempt, error = %err, "application insert failed; retrying");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Persist changes to an existing record, retrying transient failures.
    pub async fn save(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.repository.update(record.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    warn!(id = %record.id, attempt, error = %err, "application update failed; retrying");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.repository.fetch(id).await
    }

    /// The authoritative pending record for an applicant. When several
    /// pending records exist the most recently created one wins.
    pub async fn find_pending(
        &self,
        applicant: &UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let mut pending = self.repository.pending_for(applicant).await?;
        pending.sort_by_key(|record| record.created_at);
        Ok(pending.pop())
    }
}
