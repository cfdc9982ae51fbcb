//! Job postings, applications and their documents, status workflow and AI
//! scores, all routed through the authorization gate.

pub mod domain;
pub mod events;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, DocumentDownload, Posting, PostingDraft,
    PostingId, PostingUpdate, Score, ScoreView, StoredDocument, Upload, MAX_AI_SCORE,
    MAX_TITLE_CHARS,
};
pub use events::{
    EmailMessage, Notification, NotificationDispatcher, NotificationKind, Notifier, NotifyError,
    RecruitmentEvent,
};
pub use repository::{ApplicationRepository, PostingRepository, RepositoryError};
pub(crate) use router::error_response;
pub use router::{recruitment_router, IDENTITY_HEADER};
pub use service::{RecruitmentBackends, RecruitmentError, RecruitmentService};
