use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};
use serde::Serialize;

use crate::error::AtomError;

/// JSON response with the CORS header every handler sends.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

/// `{"error": "..."}` with the status code of the error class.
pub fn error_response(err: &AtomError) -> Result<Response<Body>, LambdaError> {
    json_response(err.status_code(), &serde_json::json!({ "error": err.to_string() }))
}

pub fn no_content() -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, LambdaError> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "Not found" }))
}
