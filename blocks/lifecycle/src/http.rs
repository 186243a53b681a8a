use icrs_atoms::complaints::{ComplaintStore, SubmitComplaintPayload, UpdateStatusPayload};
use icrs_atoms::http::{error_response, json_response, no_content};
use icrs_atoms::media::{ObjectStorage, UploadImagePayload};
use icrs_atoms::AtomError;
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::de::DeserializeOwned;

use crate::controller::LifecycleController;
use crate::types::Intent;

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AtomError> {
    serde_json::from_slice(body)
        .map_err(|e| AtomError::Validation(format!("invalid request body: {}", e)))
}

async fn run_intent<S: ComplaintStore, O: ObjectStorage>(
    controller: &LifecycleController<S, O>,
    intent: Intent,
    success: StatusCode,
) -> Result<Response<Body>, Error> {
    let name = intent.name();
    match controller.dispatch(intent).await {
        // Deleted carries no record
        Ok(outcome) => match outcome.complaint() {
            Some(complaint) => json_response(success, complaint),
            None => no_content(),
        },
        Err(e) => {
            tracing::warn!(intent = name, error = %e, "Intent rejected");
            error_response(&e)
        }
    }
}

/// HANDLER: POST /complaints
pub async fn submit_complaint_handler<S: ComplaintStore, O: ObjectStorage>(
    controller: &LifecycleController<S, O>,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: SubmitComplaintPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    run_intent(controller, Intent::Submit(payload), StatusCode::CREATED).await
}

/// HANDLER: PATCH /complaints/{id}/status
pub async fn change_status_handler<S: ComplaintStore, O: ObjectStorage>(
    controller: &LifecycleController<S, O>,
    complaint_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: UpdateStatusPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let intent = Intent::ChangeStatus {
        id: complaint_id.to_string(),
        status: payload.status,
    };
    run_intent(controller, intent, StatusCode::OK).await
}

/// HANDLER: POST /complaints/{id}/image
pub async fn upload_image_handler<S: ComplaintStore, O: ObjectStorage>(
    controller: &LifecycleController<S, O>,
    complaint_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let file = match parse_body::<UploadImagePayload>(body).and_then(UploadImagePayload::decode) {
        Ok(f) => f,
        Err(e) => return error_response(&e),
    };
    tracing::debug!(
        complaint_id,
        file_name = %file.file_name,
        bytes = file.bytes.len(),
        "Received resolution image"
    );
    let intent = Intent::UploadImage {
        id: complaint_id.to_string(),
        file,
    };
    run_intent(controller, intent, StatusCode::OK).await
}

/// HANDLER: DELETE /complaints/{id}
pub async fn delete_complaint_handler<S: ComplaintStore, O: ObjectStorage>(
    controller: &LifecycleController<S, O>,
    complaint_id: &str,
) -> Result<Response<Body>, Error> {
    let intent = Intent::Delete {
        id: complaint_id.to_string(),
    };
    run_intent(controller, intent, StatusCode::NO_CONTENT).await
}
