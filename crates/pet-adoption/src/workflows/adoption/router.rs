use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::access::{Caller, Role};
use super::domain::{
    CommitmentInput, HandoffInput, HomeVisitInput, InterviewInput, ProcessId, RequestId, Stage,
};
use super::repository::{AdoptionRepository, NotificationPublisher, RepositoryError};
use super::service::{AdoptionProcessService, ProcessError};
use super::uploads::{CommitmentStorage, CommitmentUpload, UploadRejection};

/// Multipart field carrying the signed commitment image.
pub const COMMITMENT_FIELD: &str = "archivo";

type SharedService<R, N, S> = Arc<AdoptionProcessService<R, N, S>>;

/// Router builder exposing the adoption process endpoints.
pub fn process_router<R, N, S>(service: SharedService<R, N, S>) -> Router
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    // Multipart framing adds a little on top of the image itself.
    let body_limit = service.upload_policy().max_bytes() + 64 * 1024;

    Router::new()
        .route(
            "/api/v1/procesos",
            post(start_handler::<R, N, S>).get(list_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/mis-procesos",
            get(my_processes_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/solicitud/:solicitud_id",
            get(by_request_handler::<R, N, S>),
        )
        .route("/api/v1/procesos/:id", get(get_handler::<R, N, S>))
        .route(
            "/api/v1/procesos/:id/entrevista",
            patch(interview_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/:id/visita",
            patch(home_visit_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/:id/compromiso",
            post(commitment_upload_handler::<R, N, S>).patch(commitment_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/:id/entrega",
            patch(handoff_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/:id/aprobar/:etapa",
            patch(approve_handler::<R, N, S>),
        )
        .route(
            "/api/v1/procesos/:id/rechazar/:etapa",
            patch(reject_handler::<R, N, S>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct StartProcessRequest {
    #[serde(alias = "solicitudId")]
    pub solicitud_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectStageRequest {
    #[serde(default)]
    pub motivo: String,
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProcessError::InvalidArgument(_) | ProcessError::Upstream(_) => {
                StatusCode::BAD_REQUEST
            }
            ProcessError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ProcessError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProcessError::NotFound(_) | ProcessError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            ProcessError::InvalidState(_) | ProcessError::Repository(RepositoryError::Conflict) => {
                StatusCode::CONFLICT
            }
            ProcessError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            warn!(error = %self, "adoption process request failed");
        }

        let body = json!({
            "success": false,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ProcessError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ProcessError::InvalidArgument(rejection.body_text()))
}

fn parse_stage(raw: &str) -> Result<Stage, ProcessError> {
    Ok(raw.parse::<Stage>()?)
}

pub(crate) async fn start_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    payload: Result<Json<StartProcessRequest>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let request = json_body(payload)?;
    let process = service.start(&RequestId(request.solicitud_id))?;
    let body = json!({ "success": true, "proceso": process });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub(crate) async fn interview_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<InterviewInput>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let process = service.record_interview(&ProcessId(id), json_body(payload)?)?;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn home_visit_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<HomeVisitInput>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let process = service.record_home_visit(&ProcessId(id), json_body(payload)?)?;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn commitment_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<CommitmentInput>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let process = service.record_commitment(&ProcessId(id), json_body(payload)?)?;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn commitment_upload_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    let multipart =
        multipart.map_err(|rejection| ProcessError::InvalidArgument(rejection.body_text()))?;
    let upload = read_commitment(multipart, service.upload_policy().max_bytes()).await?;
    // Storage backends write to disk, so keep them off the async workers.
    let process = tokio::task::spawn_blocking(move || {
        service.submit_commitment(&caller, &ProcessId(id), upload)
    })
    .await
    .map_err(|err| {
        ProcessError::Repository(RepositoryError::Unavailable(format!(
            "commitment upload task failed: {err}"
        )))
    })??;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn handoff_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<HandoffInput>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let process = service.record_handoff(&ProcessId(id), json_body(payload)?)?;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn approve_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path((id, etapa)): Path<(String, String)>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let stage = parse_stage(&etapa)?;
    let receipt = service.approve(&ProcessId(id), stage)?;
    let body = json!({
        "success": true,
        "message": receipt.message(),
        "finalized": receipt.finalized(),
        "proceso": receipt.process,
    });
    Ok(Json(body).into_response())
}

pub(crate) async fn reject_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path((id, etapa)): Path<(String, String)>,
    payload: Result<Json<RejectStageRequest>, JsonRejection>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let stage = parse_stage(&etapa)?;
    let request = json_body(payload)?;
    let process = service.reject(&ProcessId(id), stage, &request.motivo)?;
    Ok(Json(json!({ "success": true, "proceso": process })).into_response())
}

pub(crate) async fn list_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_staff()?;
    let processes = service.list()?;
    Ok(Json(json!({ "success": true, "procesos": processes })).into_response())
}

pub(crate) async fn get_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    let view = service.get(&caller, &ProcessId(id))?;
    Ok(Json(json!({ "success": true, "proceso": view })).into_response())
}

pub(crate) async fn by_request_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
    Path(solicitud_id): Path<String>,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    let view = service.get_by_request(&caller, &RequestId(solicitud_id))?;
    Ok(Json(json!({ "success": true, "proceso": view })).into_response())
}

pub(crate) async fn my_processes_handler<R, N, S>(
    State(service): State<SharedService<R, N, S>>,
    caller: Caller,
) -> Result<Response, ProcessError>
where
    R: AdoptionRepository + 'static,
    N: NotificationPublisher + 'static,
    S: CommitmentStorage + 'static,
{
    caller.require_role(Role::Adopter)?;
    let processes = service.list_for_adopter(&caller.user_id)?;
    Ok(Json(json!({ "success": true, "procesos": processes })).into_response())
}

async fn read_commitment(
    mut multipart: Multipart,
    limit: usize,
) -> Result<Option<CommitmentUpload>, ProcessError> {
    let multipart_error = |err: MultipartError| -> ProcessError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadRejection::ExceedsLimit { limit }.into()
        } else {
            ProcessError::InvalidArgument(err.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(COMMITMENT_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        return Ok(Some(CommitmentUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}
