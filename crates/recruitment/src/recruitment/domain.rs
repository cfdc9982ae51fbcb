use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::IdentityId;
use crate::documents::DocumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostingId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

impl fmt::Display for PostingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open (or closed) job opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub title: String,
    pub description: String,
    pub required_skills: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Posting {
    /// Case-insensitive match against title, description and skills.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&self.title, &self.description, &self.required_skills]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Fields supplied when opening a posting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostingDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_skills: String,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Partial update; absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub required_skills: Option<String>,
    pub active: Option<bool>,
}

pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    InReview,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::InReview => "in_review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Wording used in candidate-facing messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "Submitted",
            ApplicationStatus::InReview => "In review",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
        }
    }
}

/// Pointer to an accepted document in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub key: String,
    pub original_name: String,
    pub size: u64,
}

impl StoredDocument {
    /// Final segment of the storage key, safe to hand back as a download name.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// AI screening result attached to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub ai_score: Option<f32>,
    pub recommendation: String,
    pub analysed_at: DateTime<Utc>,
}

pub const MAX_AI_SCORE: f32 = 999.99;

/// A candidate's submission against one posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub candidate: IdentityId,
    pub posting: PostingId,
    pub cv: Option<StoredDocument>,
    pub cover_letter: Option<StoredDocument>,
    pub submitted_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub score: Option<Score>,
}

impl Application {
    pub fn document(&self, kind: DocumentKind) -> Option<&StoredDocument> {
        match kind {
            DocumentKind::Cv => self.cv.as_ref(),
            DocumentKind::CoverLetter => self.cover_letter.as_ref(),
        }
    }

    pub fn set_document(&mut self, kind: DocumentKind, document: StoredDocument) {
        match kind {
            DocumentKind::Cv => self.cv = Some(document),
            DocumentKind::CoverLetter => self.cover_letter = Some(document),
        }
    }
}

/// Raw bytes of a file submitted with an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Score listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreView {
    pub application_id: ApplicationId,
    pub candidate: IdentityId,
    pub posting: PostingId,
    pub score: Score,
}

/// A stored document ready to be streamed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDownload {
    pub file_name: String,
    pub content_type: mime::Mime,
    pub bytes: Vec<u8>,
}
