use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::access::{Caller, DenyReason, IdentityId, Role, StoreError};
use crate::documents::MAX_FILE_SIZE_BYTES;

use super::domain::{
    ApplicationId, ApplicationStatus, PostingDraft, PostingId, PostingUpdate, Upload,
};
use super::repository::RepositoryError;
use super::service::{RecruitmentError, RecruitmentService};

/// Header carrying the authenticated identity, set by the fronting proxy.
pub const IDENTITY_HEADER: &str = "x-identity-id";

/// Two documents plus form overhead.
const BODY_LIMIT_BYTES: usize = 2 * MAX_FILE_SIZE_BYTES as usize + 64 * 1024;

/// Router builder exposing the recruitment endpoints.
pub fn recruitment_router(service: Arc<RecruitmentService>) -> Router {
    Router::new()
        .route("/api/v1/accounts", post(register_handler))
        .route("/api/v1/accounts/:identity_id/role", put(assign_role_handler))
        .route(
            "/api/v1/postings",
            get(list_postings_handler).post(create_posting_handler),
        )
        .route(
            "/api/v1/postings/:posting_id",
            put(update_posting_handler).delete(delete_posting_handler),
        )
        .route(
            "/api/v1/postings/:posting_id/applications",
            get(posting_applications_handler),
        )
        .route(
            "/api/v1/applications",
            get(list_applications_handler).post(submit_handler),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler).delete(delete_application_handler),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            put(status_handler),
        )
        .route(
            "/api/v1/applications/:application_id/documents",
            put(amend_documents_handler),
        )
        .route("/api/v1/applications/:application_id/cv", get(download_cv_handler))
        .route("/api/v1/applications/:application_id/score", post(score_handler))
        .route("/api/v1/scores", get(list_scores_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(service)
}

fn caller_from(service: &RecruitmentService, headers: &HeaderMap) -> Caller {
    let id = headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(IdentityId);
    service.resolve_caller(id)
}

pub(crate) fn error_response(err: RecruitmentError) -> Response {
    let (status, payload) = match &err {
        RecruitmentError::Forbidden(DenyReason::Anonymous) => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": err.to_string(), "reason": DenyReason::Anonymous }),
        ),
        RecruitmentError::Forbidden(reason) => (
            StatusCode::FORBIDDEN,
            json!({ "error": err.to_string(), "reason": reason }),
        ),
        RecruitmentError::Rejected { kind, reason } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": reason.message(),
                "field": kind.tag(),
                "code": reason.code(),
            }),
        ),
        RecruitmentError::NotFound(_)
        | RecruitmentError::Repository(RepositoryError::NotFound)
        | RecruitmentError::Directory(StoreError::UnknownIdentity(_)) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        RecruitmentError::Conflict(_)
        | RecruitmentError::Repository(RepositoryError::Conflict)
        | RecruitmentError::Directory(StoreError::DuplicateHandle(_))
        | RecruitmentError::Directory(StoreError::DuplicateEmail(_)) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        RecruitmentError::InactivePosting
        | RecruitmentError::InvalidScore
        | RecruitmentError::Invalid(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        RecruitmentError::Repository(_)
        | RecruitmentError::Storage(_)
        | RecruitmentError::Directory(_) => {
            error!(error = %err, "recruitment request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal error" }),
            )
        }
    };
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, RecruitmentError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Runs service calls that read or write stored documents on the blocking pool.
async fn run_blocking<F>(work: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "document task did not complete");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Registration {
    handle: String,
    #[serde(default)]
    email: Option<String>,
}

pub(crate) async fn register_handler(
    State(service): State<Arc<RecruitmentService>>,
    Json(registration): Json<Registration>,
) -> Response {
    respond(
        StatusCode::CREATED,
        service.register_candidate(
            &registration.handle,
            registration.email.as_deref().unwrap_or_default(),
        ),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleAssignment {
    role: Role,
}

pub(crate) async fn assign_role_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(identity_id): Path<u64>,
    Json(assignment): Json<RoleAssignment>,
) -> Response {
    let caller = caller_from(&service, &headers);
    match service.assign_role(&caller, IdentityId(identity_id), assignment.role) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostingQuery {
    search: Option<String>,
}

pub(crate) async fn list_postings_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Query(query): Query<PostingQuery>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.list_postings(&caller, query.search.as_deref()),
    )
}

pub(crate) async fn create_posting_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Json(draft): Json<PostingDraft>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(StatusCode::CREATED, service.create_posting(&caller, draft))
}

pub(crate) async fn update_posting_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(posting_id): Path<u64>,
    Json(update): Json<PostingUpdate>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.update_posting(&caller, PostingId(posting_id), update),
    )
}

pub(crate) async fn delete_posting_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(posting_id): Path<u64>,
) -> Response {
    let caller = caller_from(&service, &headers);
    match service.delete_posting(&caller, PostingId(posting_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn posting_applications_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(posting_id): Path<u64>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.posting_applications(&caller, PostingId(posting_id)),
    )
}

/// Fields read from an application upload form.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    posting_id: Option<PostingId>,
    cv: Option<Upload>,
    cover_letter: Option<Upload>,
}

fn malformed(err: MultipartError) -> RecruitmentError {
    RecruitmentError::Invalid(format!("malformed upload: {err}"))
}

pub(crate) async fn read_upload_form(
    mut multipart: Multipart,
) -> Result<UploadForm, RecruitmentError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "posting_id" => {
                let text = field.text().await.map_err(malformed)?;
                let id = text.trim().parse::<u64>().map_err(|_| {
                    RecruitmentError::Invalid("posting_id must be a number".to_string())
                })?;
                form.posting_id = Some(PostingId(id));
            }
            "cv" | "cover_letter" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                // An empty file input arrives as a nameless, empty part.
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                let upload = Upload::new(filename, bytes.to_vec());
                if name == "cv" {
                    form.cv = Some(upload);
                } else {
                    form.cover_letter = Some(upload);
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let caller = caller_from(&service, &headers);
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(err) => return error_response(err),
    };
    let Some(posting_id) = form.posting_id else {
        return error_response(RecruitmentError::Invalid(
            "posting_id is required".to_string(),
        ));
    };
    run_blocking(move || {
        respond(
            StatusCode::CREATED,
            service.submit_application(&caller, posting_id, form.cv, form.cover_letter),
        )
    })
    .await
}

pub(crate) async fn list_applications_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(StatusCode::OK, service.list_applications(&caller))
}

pub(crate) async fn application_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.get_application(&caller, ApplicationId(application_id)),
    )
}

pub(crate) async fn delete_application_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
) -> Response {
    let caller = caller_from(&service, &headers);
    run_blocking(move || {
        match service.delete_application(&caller, ApplicationId(application_id)) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => error_response(err),
        }
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: ApplicationStatus,
}

pub(crate) async fn status_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
    Json(change): Json<StatusChange>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.update_status(&caller, ApplicationId(application_id), change.status),
    )
}

pub(crate) async fn amend_documents_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
    multipart: Multipart,
) -> Response {
    let caller = caller_from(&service, &headers);
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(err) => return error_response(err),
    };
    run_blocking(move || {
        respond(
            StatusCode::OK,
            service.amend_documents(
                &caller,
                ApplicationId(application_id),
                form.cv,
                form.cover_letter,
            ),
        )
    })
    .await
}

pub(crate) async fn download_cv_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
) -> Response {
    let caller = caller_from(&service, &headers);
    run_blocking(move || match service.download_cv(&caller, ApplicationId(application_id)) {
        Ok(download) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, download.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", download.file_name),
                ),
            ],
            download.bytes,
        )
            .into_response(),
        Err(err) => error_response(err),
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreSubmission {
    #[serde(default)]
    ai_score: Option<f32>,
    #[serde(default)]
    recommendation: String,
}

pub(crate) async fn score_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
    Json(score): Json<ScoreSubmission>,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(
        StatusCode::OK,
        service.record_score(
            &caller,
            ApplicationId(application_id),
            score.ai_score,
            score.recommendation,
        ),
    )
}

pub(crate) async fn list_scores_handler(
    State(service): State<Arc<RecruitmentService>>,
    headers: HeaderMap,
) -> Response {
    let caller = caller_from(&service, &headers);
    respond(StatusCode::OK, service.list_scores(&caller))
}
