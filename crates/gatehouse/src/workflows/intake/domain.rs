use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque platform identifier of a user (applicant or staff member).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Reference to a conversation channel on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Reference to a grantable role on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Keys identifying each step of the fixed intake questionnaire. Answer
/// extraction (display name, provisioning secret) is keyed on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKey {
    CharacterName,
    CharacterAge,
    AccessSecret,
    Backstory,
    SteamId,
    Referral,
}

impl QuestionKey {
    pub const fn label(self) -> &'static str {
        match self {
            QuestionKey::CharacterName => "Character name",
            QuestionKey::CharacterAge => "Character age",
            QuestionKey::AccessSecret => "Server access password",
            QuestionKey::Backstory => "Character backstory",
            QuestionKey::SteamId => "Steam ID",
            QuestionKey::Referral => "How did you find the server?",
        }
    }
}

/// One prompt in the intake flow: the key supplies the short label, the
/// detail line tells the applicant what a good answer looks like.
#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub key: QuestionKey,
    pub detail: &'static str,
}

/// Fixed, ordered list of questions every applicant answers.
#[derive(Debug, Clone)]
pub struct Questionnaire {
    questions: Vec<Question>,
}

impl Questionnaire {
    /// The standard intake list used by the deployment.
    pub fn standard() -> Self {
        Self {
            questions: vec![
                Question {
                    key: QuestionKey::CharacterName,
                    detail: "First and last name of your roleplay character. This also \
                             becomes your login user on the game server.",
                },
                Question {
                    key: QuestionKey::CharacterAge,
                    detail: "How old is your character? The age must fit the server lore.",
                },
                Question {
                    key: QuestionKey::AccessSecret,
                    detail: "This will be your password for logging into the game server.",
                },
                Question {
                    key: QuestionKey::Backstory,
                    detail: "Tell your character's story. It must be consistent with the \
                             server lore.",
                },
                Question {
                    key: QuestionKey::SteamId,
                    detail: "Provide your Steam ID.",
                },
                Question {
                    key: QuestionKey::Referral,
                    detail: "Searching, a friend's invite, and so on.",
                },
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }
}

/// A single collected answer, keyed by the question that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub key: QuestionKey,
    pub text: String,
}

/// The complete ordered set of answers produced by a finished session.
/// Insertion order equals question order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub applicant: UserId,
    pub answers: Vec<Answer>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Display name is the first answer, by convention.
    pub fn display_name(&self) -> &str {
        self.answers
            .first()
            .map(|answer| answer.text.as_str())
            .unwrap_or("unknown")
    }

    pub fn answer(&self, key: QuestionKey) -> Option<&str> {
        self.answers
            .iter()
            .find(|answer| answer.key == key)
            .map(|answer| answer.text.as_str())
    }
}

/// Review status tracked for a stored application. `Approved` and `Rejected`
/// are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}
