use std::sync::Arc;

use icrs_atoms::complaints::http as complaints_http;
use icrs_atoms::http::{error_response, json_response, not_found};
use icrs_atoms::AtomError;
use icrs_shared::auth::{self, SessionProvider};
use icrs_shared::AppState;
use lambda_http::http::header::{HeaderValue, SET_COOKIE, VARY};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use lifecycle_block::http as lifecycle_http;

/// Allow-listed origins are echoed with credentials. Anything else gets a
/// wildcard without credentials, which is enough for the public routes.
fn with_cors_headers(
    mut resp: Response<Body>,
    request_origin: Option<&str>,
    allowed_origins: &[String],
) -> Response<Body> {
    let cors_origin = auth::get_cors_origin(request_origin, allowed_origins)
        .and_then(|o| HeaderValue::from_str(o).ok());

    let headers = resp.headers_mut();
    match cors_origin {
        Some(origin) => {
            headers.insert("Access-Control-Allow-Origin", origin);
            headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
        }
        None => {
            headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
        }
    }
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,Cookie"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));
    resp
}

fn finalize_response(
    resp: Result<Response<Body>, Error>,
    request_origin: Option<&str>,
    allowed_origins: &[String],
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, request_origin, allowed_origins))
}

fn path_parts(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Main Lambda handler. Public routes first, then the session routes, then
/// everything under `/complaints` that needs an administrator.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body: &[u8] = event.body();
    let request_origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
    let allowed = state.config.allowed_origins.as_slice();
    tracing::info!(method = %method, path, "API request");

    if method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp, request_origin, allowed));
    }

    let parts = path_parts(path);
    let repo = state.controller.complaints();

    // Public routes
    let public = match (method, parts.as_slice()) {
        (&Method::GET, ["health"]) => Some(complaints_http::health_handler(repo).await),
        (&Method::POST, ["complaints"]) => Some(
            lifecycle_http::submit_complaint_handler(&state.controller, body).await,
        ),
        (&Method::GET, ["complaints", "resolved"]) => {
            Some(complaints_http::list_resolved_handler(repo).await)
        }
        _ => None,
    };
    if let Some(resp) = public {
        return finalize_response(resp, request_origin, allowed);
    }

    // Session routes
    match (method, parts.as_slice()) {
        (&Method::GET, ["session"]) => {
            let resp = match auth::require_session(&state.sessions, event.headers()).await {
                Ok(session) => json_response(StatusCode::OK, &session),
                Err(e) => error_response(&e),
            };
            return finalize_response(resp, request_origin, allowed);
        }
        (&Method::POST, ["logout"]) => {
            return finalize_response(logout(&state, &event).await, request_origin, allowed);
        }
        _ => {}
    }

    if parts.first() != Some(&"complaints") {
        return finalize_response(not_found(), request_origin, allowed);
    }

    // Administrative routes
    let session = match auth::require_session(&state.sessions, event.headers()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(path, error = %e, "Rejected unauthenticated admin request");
            return finalize_response(error_response(&e), request_origin, allowed);
        }
    };
    tracing::debug!(admin = %session.username, "Admin request");

    let resp = match (method, parts.as_slice()) {
        (&Method::GET, ["complaints"]) => {
            state.ensure_admin_view_ready().await;
            complaints_http::list_complaints_handler(repo).await
        }
        (&Method::GET, ["complaints", "stats"]) => {
            complaints_http::status_counts_handler(repo).await
        }
        (&Method::GET, ["complaints", complaint_id]) => {
            complaints_http::get_complaint_handler(repo, complaint_id).await
        }
        (&Method::PATCH, ["complaints", complaint_id, "status"]) => {
            lifecycle_http::change_status_handler(&state.controller, complaint_id, body).await
        }
        (&Method::POST, ["complaints", complaint_id, "image"]) => {
            state.ensure_admin_view_ready().await;
            lifecycle_http::upload_image_handler(&state.controller, complaint_id, body).await
        }
        (&Method::DELETE, ["complaints", complaint_id]) => {
            lifecycle_http::delete_complaint_handler(&state.controller, complaint_id).await
        }
        _ => not_found(),
    };

    finalize_response(resp, request_origin, allowed)
}

/// Ends the Cognito session and clears the cookie. A missing token still
/// clears the cookie.
async fn logout(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    if let Some(token) = auth::extract_token(event.headers()) {
        match state.sessions.end_session(&token).await {
            Ok(()) | Err(AtomError::Unauthorized) => {}
            Err(e) => {
                tracing::error!(error = %e, "Logout failed");
                return error_response(&e);
            }
        }
    }

    let mut resp = json_response(StatusCode::OK, &serde_json::json!({ "message": "ok" }))?;
    if let Ok(cookie) = HeaderValue::from_str(&auth::clear_cookie(auth::ACCESS_TOKEN_COOKIE)) {
        resp.headers_mut().append(SET_COOKIE, cookie);
    }
    Ok(resp)
}
