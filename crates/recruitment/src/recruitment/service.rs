use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::access::{
    AuthorizationGate, Caller, DenyReason, ElevationPolicy, GroupMembershipStore, Identity,
    IdentityDirectory, IdentityId, Operation, PolicyTable, Role, RoleAssignmentService, RoleStore,
    StoreError,
};
use crate::documents::{
    content_type_for, DocumentKind, DocumentStore, DocumentValidator, RejectionReason,
    StorageError, StoragePathBuilder, Verdict,
};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, DocumentDownload, Posting, PostingDraft,
    PostingId, PostingUpdate, Score, ScoreView, StoredDocument, Upload, MAX_AI_SCORE,
    MAX_TITLE_CHARS,
};
use super::events::{NotificationDispatcher, Notifier, RecruitmentEvent};
use super::repository::{ApplicationRepository, PostingRepository, RepositoryError};

/// Collaborators the service is assembled from.
#[derive(Clone)]
pub struct RecruitmentBackends {
    pub directory: Arc<dyn IdentityDirectory>,
    pub roles: Arc<dyn RoleStore>,
    pub groups: Arc<dyn GroupMembershipStore>,
    pub postings: Arc<dyn PostingRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub documents: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Recruitment workflows behind the authorization gate: postings,
/// applications with their documents, status changes and AI scores.
pub struct RecruitmentService {
    gate: AuthorizationGate,
    assignments: RoleAssignmentService,
    directory: Arc<dyn IdentityDirectory>,
    postings: Arc<dyn PostingRepository>,
    applications: Arc<dyn ApplicationRepository>,
    documents: Arc<dyn DocumentStore>,
    dispatcher: NotificationDispatcher,
    validator: DocumentValidator,
    paths: StoragePathBuilder,
    posting_sequence: AtomicU64,
    application_sequence: AtomicU64,
}

impl RecruitmentService {
    pub fn new(backends: RecruitmentBackends, elevation: ElevationPolicy) -> Self {
        Self::with_policy(backends, PolicyTable::standard(), elevation)
    }

    pub fn with_policy(
        backends: RecruitmentBackends,
        policy: PolicyTable,
        elevation: ElevationPolicy,
    ) -> Self {
        let RecruitmentBackends {
            directory,
            roles,
            groups,
            postings,
            applications,
            documents,
            notifier,
        } = backends;

        Self {
            gate: AuthorizationGate::new(roles.clone(), policy, elevation),
            assignments: RoleAssignmentService::new(directory.clone(), roles.clone(), groups),
            dispatcher: NotificationDispatcher::new(directory.clone(), roles, notifier),
            directory,
            postings,
            applications,
            documents,
            validator: DocumentValidator::new(),
            paths: StoragePathBuilder::default(),
            posting_sequence: AtomicU64::new(1),
            application_sequence: AtomicU64::new(1),
        }
    }

    pub fn with_paths(mut self, paths: StoragePathBuilder) -> Self {
        self.paths = paths;
        self
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn assignments(&self) -> &RoleAssignmentService {
        &self.assignments
    }

    /// Unknown ids and directory failures resolve to an anonymous caller.
    pub fn resolve_caller(&self, id: Option<IdentityId>) -> Caller {
        let Some(id) = id else {
            return Caller::Anonymous;
        };
        match self.directory.find(id) {
            Ok(Some(identity)) => Caller::Identified(identity),
            Ok(None) => Caller::Anonymous,
            Err(err) => {
                warn!(identity = %id, error = %err, "caller lookup failed");
                Caller::Anonymous
            }
        }
    }

    fn require(&self, caller: &Caller, operation: Operation) -> Result<(), RecruitmentError> {
        self.gate
            .authorize_operation(caller, operation)
            .require()
            .map_err(RecruitmentError::Forbidden)
    }

    /// Record-level operations refuse anonymous callers before any lookup.
    fn require_identified(caller: &Caller) -> Result<(), RecruitmentError> {
        match caller {
            Caller::Anonymous => Err(RecruitmentError::Forbidden(DenyReason::Anonymous)),
            Caller::Identified(_) => Ok(()),
        }
    }

    fn require_owner_or(
        &self,
        caller: &Caller,
        operation: Operation,
        owner: IdentityId,
    ) -> Result<(), RecruitmentError> {
        self.gate
            .authorize_record(caller, operation, owner)
            .require()
            .map_err(RecruitmentError::Forbidden)
    }

    /// Handles and e-mail addresses are unique, compared case-insensitively.
    pub fn register_candidate(
        &self,
        handle: &str,
        email: &str,
    ) -> Result<Identity, RecruitmentError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(RecruitmentError::Invalid("handle must not be empty".to_string()));
        }
        let email = checked_email(email)?;
        let identity = self.assignments.register_candidate(handle, email)?;
        info!(identity = %identity.id, handle = %identity.handle, "candidate registered");
        Ok(identity)
    }

    pub fn assign_role(
        &self,
        caller: &Caller,
        target: IdentityId,
        role: Role,
    ) -> Result<(), RecruitmentError> {
        self.require(caller, Operation::AssignRole)?;
        if self.directory.find(target)?.is_none() {
            return Err(RecruitmentError::NotFound("identity"));
        }
        self.assignments.assign(target, role)?;
        Ok(())
    }

    pub fn create_posting(
        &self,
        caller: &Caller,
        draft: PostingDraft,
    ) -> Result<Posting, RecruitmentError> {
        self.require(caller, Operation::ManagePostings)?;
        let title = checked_title(&draft.title)?;
        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(RecruitmentError::Invalid(
                "description must not be empty".to_string(),
            ));
        }

        let posting = Posting {
            id: PostingId(self.posting_sequence.fetch_add(1, Ordering::Relaxed)),
            title,
            description,
            required_skills: draft.required_skills.trim().to_string(),
            created_at: Utc::now(),
            active: draft.active.unwrap_or(true),
        };
        let stored = self.postings.insert(posting)?;
        info!(posting = %stored.id, title = %stored.title, "posting created");

        self.dispatcher.dispatch(&RecruitmentEvent::PostingCreated {
            posting: stored.clone(),
        });
        Ok(stored)
    }

    pub fn update_posting(
        &self,
        caller: &Caller,
        id: PostingId,
        update: PostingUpdate,
    ) -> Result<Posting, RecruitmentError> {
        self.require(caller, Operation::ManagePostings)?;
        let mut posting = self.fetch_posting(id)?;

        if let Some(title) = update.title {
            posting.title = checked_title(&title)?;
        }
        if let Some(description) = update.description {
            let description = description.trim().to_string();
            if description.is_empty() {
                return Err(RecruitmentError::Invalid(
                    "description must not be empty".to_string(),
                ));
            }
            posting.description = description;
        }
        if let Some(skills) = update.required_skills {
            posting.required_skills = skills.trim().to_string();
        }
        if let Some(active) = update.active {
            posting.active = active;
        }

        self.postings.update(posting.clone())?;
        Ok(posting)
    }

    /// Removes the posting along with every application filed against it and
    /// their stored documents.
    pub fn delete_posting(&self, caller: &Caller, id: PostingId) -> Result<(), RecruitmentError> {
        self.require(caller, Operation::ManagePostings)?;
        let removed = match self.postings.remove(id) {
            Ok(posting) => posting,
            Err(RepositoryError::NotFound) => return Err(RecruitmentError::NotFound("posting")),
            Err(err) => return Err(err.into()),
        };
        let dropped = self.applications.remove_for_posting(id)?;
        self.discard(
            dropped
                .iter()
                .flat_map(|application| application.cv.iter().chain(application.cover_letter.iter())),
        );
        info!(posting = %removed.id, applications = dropped.len(), "posting deleted");
        Ok(())
    }

    /// Active postings, newest first. Staff who manage postings also see
    /// inactive ones.
    pub fn list_postings(
        &self,
        caller: &Caller,
        search: Option<&str>,
    ) -> Result<Vec<Posting>, RecruitmentError> {
        self.require(caller, Operation::ViewPostings)?;
        let include_inactive = self
            .gate
            .authorize_operation(caller, Operation::ManagePostings)
            .is_allowed();

        let mut postings: Vec<Posting> = self
            .postings
            .list()?
            .into_iter()
            .filter(|posting| include_inactive || posting.active)
            .filter(|posting| search.map_or(true, |term| posting.matches(term)))
            .collect();
        postings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(postings)
    }

    pub fn posting_applications(
        &self,
        caller: &Caller,
        id: PostingId,
    ) -> Result<Vec<Application>, RecruitmentError> {
        self.require(caller, Operation::ListPostingApplications)?;
        self.fetch_posting(id)?;
        let mut applications = self.applications.for_posting(id)?;
        newest_first(&mut applications);
        Ok(applications)
    }

    /// Files an application. Every upload is validated before anything is
    /// written, and a candidate may apply to a posting only once.
    pub fn submit_application(
        &self,
        caller: &Caller,
        posting_id: PostingId,
        cv: Option<Upload>,
        cover_letter: Option<Upload>,
    ) -> Result<Application, RecruitmentError> {
        self.require(caller, Operation::SubmitApplication)?;
        let candidate = caller
            .id()
            .ok_or(RecruitmentError::Forbidden(DenyReason::Anonymous))?;

        let posting = self.fetch_posting(posting_id)?;
        if !posting.active {
            return Err(RecruitmentError::InactivePosting);
        }
        if self
            .applications
            .for_candidate(candidate)?
            .iter()
            .any(|existing| existing.posting == posting_id)
        {
            return Err(RecruitmentError::Conflict("application"));
        }

        let uploads = [(DocumentKind::Cv, cv), (DocumentKind::CoverLetter, cover_letter)];
        self.screen_uploads(&uploads)?;

        let mut application = Application {
            id: ApplicationId(self.application_sequence.fetch_add(1, Ordering::Relaxed)),
            candidate,
            posting: posting_id,
            cv: None,
            cover_letter: None,
            submitted_at: Utc::now(),
            status: ApplicationStatus::Submitted,
            score: None,
        };
        let written = self.store_uploads(candidate, &uploads)?;
        for (kind, document) in &written {
            application.set_document(*kind, document.clone());
        }

        let stored = match self.applications.insert(application) {
            Ok(stored) => stored,
            Err(err) => {
                self.discard(written.iter().map(|(_, document)| document));
                return Err(match err {
                    RepositoryError::Conflict => RecruitmentError::Conflict("application"),
                    other => other.into(),
                });
            }
        };
        info!(application = %stored.id, posting = %posting_id, candidate = %candidate, "application submitted");

        self.dispatcher.dispatch(&RecruitmentEvent::ApplicationCreated {
            application: stored.id,
            candidate,
            posting_title: posting.title,
        });
        Ok(stored)
    }

    /// Staff see every application; candidates see only their own.
    pub fn list_applications(&self, caller: &Caller) -> Result<Vec<Application>, RecruitmentError> {
        let mut applications = self.visible_applications(caller)?;
        newest_first(&mut applications);
        Ok(applications)
    }

    pub fn get_application(
        &self,
        caller: &Caller,
        id: ApplicationId,
    ) -> Result<Application, RecruitmentError> {
        Self::require_identified(caller)?;
        let application = self.fetch_application(id)?;
        self.require_owner_or(caller, Operation::ViewApplications, application.candidate)?;
        Ok(application)
    }

    /// Withdraws an application (owner) or removes it (staff), along with
    /// its stored documents.
    pub fn delete_application(
        &self,
        caller: &Caller,
        id: ApplicationId,
    ) -> Result<(), RecruitmentError> {
        Self::require_identified(caller)?;
        let application = self.fetch_application(id)?;
        self.require_owner_or(caller, Operation::DeleteApplication, application.candidate)?;

        let removed = match self.applications.remove(id) {
            Ok(removed) => removed,
            Err(RepositoryError::NotFound) => {
                return Err(RecruitmentError::NotFound("application"))
            }
            Err(err) => return Err(err.into()),
        };
        self.discard(removed.cv.iter().chain(removed.cover_letter.iter()));
        info!(application = %id, candidate = %removed.candidate, "application deleted");
        Ok(())
    }

    /// Changes the status; the candidate is told only when it actually moved.
    pub fn update_status(
        &self,
        caller: &Caller,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<Application, RecruitmentError> {
        self.require(caller, Operation::UpdateApplicationStatus)?;
        let mut application = self.fetch_application(id)?;
        let previous = application.status;
        if previous == status {
            return Ok(application);
        }

        application.status = status;
        self.applications.update(application.clone())?;
        info!(application = %id, from = previous.label(), to = status.label(), "application status changed");

        let posting_title = self
            .postings
            .fetch(application.posting)?
            .map(|posting| posting.title)
            .unwrap_or_default();
        self.dispatcher
            .dispatch(&RecruitmentEvent::ApplicationStatusChanged {
                application: id,
                candidate: application.candidate,
                posting_title,
                from: previous,
                to: status,
            });
        Ok(application)
    }

    /// Replaces documents on an existing application. Nothing else about the
    /// application can be changed this way.
    pub fn amend_documents(
        &self,
        caller: &Caller,
        id: ApplicationId,
        cv: Option<Upload>,
        cover_letter: Option<Upload>,
    ) -> Result<Application, RecruitmentError> {
        Self::require_identified(caller)?;
        let mut application = self.fetch_application(id)?;
        self.require_owner_or(caller, Operation::AmendApplication, application.candidate)?;
        if cv.is_none() && cover_letter.is_none() {
            return Err(RecruitmentError::Invalid(
                "at least one document is required".to_string(),
            ));
        }

        let uploads = [(DocumentKind::Cv, cv), (DocumentKind::CoverLetter, cover_letter)];
        self.screen_uploads(&uploads)?;
        let written = self.store_uploads(application.candidate, &uploads)?;
        let mut replaced = Vec::new();
        for (kind, document) in &written {
            if let Some(previous) = application.document(*kind) {
                replaced.push(previous.clone());
            }
            application.set_document(*kind, document.clone());
        }

        if let Err(err) = self.applications.update(application.clone()) {
            self.discard(written.iter().map(|(_, document)| document));
            return Err(err.into());
        }
        self.discard(replaced.iter());
        info!(application = %id, "application documents replaced");
        Ok(application)
    }

    pub fn download_cv(
        &self,
        caller: &Caller,
        id: ApplicationId,
    ) -> Result<DocumentDownload, RecruitmentError> {
        Self::require_identified(caller)?;
        let application = self.fetch_application(id)?;
        self.require_owner_or(caller, Operation::DownloadCv, application.candidate)?;
        let document = application
            .document(DocumentKind::Cv)
            .ok_or(RecruitmentError::NotFound("cv"))?;

        let bytes = match self.documents.get(&document.key) {
            Ok(bytes) => bytes,
            Err(StorageError::Missing(key)) => {
                warn!(application = %id, %key, "stored cv is missing");
                return Err(RecruitmentError::NotFound("cv"));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(DocumentDownload {
            file_name: document.file_name().to_string(),
            content_type: content_type_for(&document.key),
            bytes,
        })
    }

    /// Attaches (or replaces) the AI screening result, rounded to cents.
    pub fn record_score(
        &self,
        caller: &Caller,
        id: ApplicationId,
        ai_score: Option<f32>,
        recommendation: String,
    ) -> Result<Application, RecruitmentError> {
        self.require(caller, Operation::RecordScore)?;
        let ai_score = match ai_score {
            Some(value) if !value.is_finite() || value.abs() > MAX_AI_SCORE => {
                return Err(RecruitmentError::InvalidScore)
            }
            Some(value) => Some((value * 100.0).round() / 100.0),
            None => None,
        };

        let mut application = self.fetch_application(id)?;
        application.score = Some(Score {
            ai_score,
            recommendation: recommendation.trim().to_string(),
            analysed_at: Utc::now(),
        });
        self.applications.update(application.clone())?;
        Ok(application)
    }

    /// Scores on the applications the caller can see.
    pub fn list_scores(&self, caller: &Caller) -> Result<Vec<ScoreView>, RecruitmentError> {
        let mut views: Vec<ScoreView> = self
            .visible_applications(caller)?
            .into_iter()
            .filter_map(|application| {
                application.score.map(|score| ScoreView {
                    application_id: application.id,
                    candidate: application.candidate,
                    posting: application.posting,
                    score,
                })
            })
            .collect();
        views.sort_by(|a, b| b.score.analysed_at.cmp(&a.score.analysed_at));
        Ok(views)
    }

    fn visible_applications(&self, caller: &Caller) -> Result<Vec<Application>, RecruitmentError> {
        if self
            .gate
            .authorize_operation(caller, Operation::ViewApplications)
            .is_allowed()
        {
            return Ok(self.applications.list()?);
        }
        self.require(caller, Operation::ListOwnApplications)?;
        let candidate = caller
            .id()
            .ok_or(RecruitmentError::Forbidden(DenyReason::Anonymous))?;
        Ok(self.applications.for_candidate(candidate)?)
    }

    fn screen_uploads(
        &self,
        uploads: &[(DocumentKind, Option<Upload>)],
    ) -> Result<(), RecruitmentError> {
        for (kind, upload) in uploads {
            let Some(upload) = upload else { continue };
            let verdict = self.validator.validate(
                &upload.filename,
                &mut Cursor::new(upload.bytes.as_slice()),
                Some(upload.bytes.len() as u64),
            );
            if let Verdict::Rejected(reason) = verdict {
                info!(kind = kind.tag(), filename = %upload.filename, reason = reason.code(), "upload rejected");
                return Err(RecruitmentError::Rejected {
                    kind: *kind,
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Writes every present upload. A failed write removes the ones already
    /// written before the error is returned.
    fn store_uploads(
        &self,
        owner: IdentityId,
        uploads: &[(DocumentKind, Option<Upload>)],
    ) -> Result<Vec<(DocumentKind, StoredDocument)>, RecruitmentError> {
        let mut written: Vec<(DocumentKind, StoredDocument)> = Vec::new();
        for (kind, upload) in uploads {
            let Some(upload) = upload else { continue };
            let key = self.paths.derive(Some(owner), *kind, &upload.filename);
            if let Err(err) = self.documents.put(&key, &upload.bytes) {
                self.discard(written.iter().map(|(_, document)| document));
                return Err(err.into());
            }
            written.push((
                *kind,
                StoredDocument {
                    key,
                    original_name: upload.filename.clone(),
                    size: upload.bytes.len() as u64,
                },
            ));
        }
        Ok(written)
    }

    /// Best-effort removal of stored files no record refers to.
    fn discard<'a>(&self, documents: impl IntoIterator<Item = &'a StoredDocument>) {
        for document in documents {
            if let Err(err) = self.documents.delete(&document.key) {
                warn!(key = %document.key, error = %err, "failed to remove stored document");
            }
        }
    }

    fn fetch_posting(&self, id: PostingId) -> Result<Posting, RecruitmentError> {
        self.postings
            .fetch(id)?
            .ok_or(RecruitmentError::NotFound("posting"))
    }

    fn fetch_application(&self, id: ApplicationId) -> Result<Application, RecruitmentError> {
        self.applications
            .fetch(id)?
            .ok_or(RecruitmentError::NotFound("application"))
    }
}

fn checked_title(raw: &str) -> Result<String, RecruitmentError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(RecruitmentError::Invalid("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(RecruitmentError::Invalid(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn checked_email(raw: &str) -> Result<String, RecruitmentError> {
    let email = raw.trim();
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.contains('@')
    });
    if !well_formed {
        return Err(RecruitmentError::Invalid(
            "a valid email address is required".to_string(),
        ));
    }
    Ok(email.to_string())
}

fn newest_first(applications: &mut [Application]) {
    applications.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then(b.id.cmp(&a.id))
    });
}

/// Error raised by the recruitment service.
#[derive(Debug, thiserror::Error)]
pub enum RecruitmentError {
    #[error("forbidden: {0}")]
    Forbidden(DenyReason),
    #[error("{} rejected: {reason}", .kind.tag())]
    Rejected {
        kind: DocumentKind,
        reason: RejectionReason,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("posting is not accepting applications")]
    InactivePosting,
    #[error("ai score must be a number between -999.99 and 999.99")]
    InvalidScore,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Directory(#[from] StoreError),
}
