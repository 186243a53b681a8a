use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};

use super::service::{ComplaintRepository, RESOLVED_FEED_LIMIT};
use super::store::ComplaintStore;
use crate::http::{error_response, json_response};

/// HTTP Handler: GET /health
pub async fn health_handler<S: ComplaintStore>(
    repo: &ComplaintRepository<S>,
) -> Result<Response<Body>, LambdaError> {
    match repo.check_connection().await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" })),
        Err(e) => {
            tracing::error!("Connection check failed: {}", e);
            error_response(&e)
        }
    }
}

/// HTTP Handler: GET /complaints
pub async fn list_complaints_handler<S: ComplaintStore>(
    repo: &ComplaintRepository<S>,
) -> Result<Response<Body>, LambdaError> {
    match repo.load_complaints().await {
        Ok(complaints) => json_response(StatusCode::OK, &complaints),
        Err(e) => {
            tracing::error!("Failed to fetch complaints: {}", e);
            error_response(&e)
        }
    }
}

/// HTTP Handler: GET /complaints/resolved
pub async fn list_resolved_handler<S: ComplaintStore>(
    repo: &ComplaintRepository<S>,
) -> Result<Response<Body>, LambdaError> {
    match repo.load_resolved_complaints(RESOLVED_FEED_LIMIT).await {
        Ok(complaints) => json_response(StatusCode::OK, &complaints),
        Err(e) => {
            tracing::error!("Error fetching resolved complaints: {}", e);
            error_response(&e)
        }
    }
}

/// HTTP Handler: GET /complaints/{id}
pub async fn get_complaint_handler<S: ComplaintStore>(
    repo: &ComplaintRepository<S>,
    complaint_id: &str,
) -> Result<Response<Body>, LambdaError> {
    match repo.get_complaint(complaint_id).await {
        Ok(complaint) => json_response(StatusCode::OK, &complaint),
        Err(e) => error_response(&e),
    }
}

/// HTTP Handler: GET /complaints/stats
pub async fn status_counts_handler<S: ComplaintStore>(
    repo: &ComplaintRepository<S>,
) -> Result<Response<Body>, LambdaError> {
    match repo.status_counts().await {
        Ok(counts) => json_response(StatusCode::OK, &counts),
        Err(e) => {
            tracing::error!("Failed to count complaints: {}", e);
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::model::{ComplaintStatus, SubmitComplaintPayload};
    use crate::memory::MemoryComplaintStore;
    use crate::retry::RetryPolicy;
    use std::sync::Arc;

    fn body_json(resp: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn resolved_handler_only_returns_resolved_rows() {
        let repo = ComplaintRepository::new(
            Arc::new(MemoryComplaintStore::new()),
            RetryPolicy::default(),
        );
        let payload = SubmitComplaintPayload {
            title: "Broken tap".into(),
            description: "Hostel B".into(),
            is_anonymous: true,
            ..Default::default()
        };
        let a = repo.submit_complaint(payload.clone().validate().unwrap()).await.unwrap();
        repo.submit_complaint(payload.validate().unwrap()).await.unwrap();
        repo.update_status(&a.id, ComplaintStatus::Resolved).await.unwrap();

        let resp = list_resolved_handler(&repo).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(&resp);
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["id"], a.id);
        assert_eq!(json[0]["status"], "RESOLVED");
        assert!(json[0]["student_name"].is_null());
    }

    #[tokio::test]
    async fn unknown_complaint_is_404() {
        let repo = ComplaintRepository::new(
            Arc::new(MemoryComplaintStore::new()),
            RetryPolicy::default(),
        );
        let resp = get_complaint_handler(&repo, "nope").await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(&resp)["error"]
            .as_str()
            .unwrap()
            .contains("nope"));
    }
}
