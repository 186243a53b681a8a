use std::future::Future;

use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use icrs_atoms::{AtomError, Result};
use lambda_http::http::HeaderMap;
use serde::Serialize;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// The signed-in administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub email: Option<String>,
}

/// Identity provider behind the administrative views.
pub trait SessionProvider: Send + Sync {
    /// Resolves a token to its session; [`AtomError::Unauthorized`] when
    /// the token is missing, expired or revoked.
    fn current_session(&self, token: &str) -> impl Future<Output = Result<Session>> + Send;

    fn end_session(&self, token: &str) -> impl Future<Output = Result<()>> + Send;
}

pub struct CognitoSessionProvider {
    client: CognitoClient,
}

impl CognitoSessionProvider {
    pub fn new(client: CognitoClient) -> Self {
        Self { client }
    }
}

impl SessionProvider for CognitoSessionProvider {
    async fn current_session(&self, token: &str) -> Result<Session> {
        let output = self
            .client
            .get_user()
            .access_token(token)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_not_authorized_exception())
                {
                    AtomError::Unauthorized
                } else {
                    AtomError::Store(format!("Cognito GetUser error: {}", DisplayErrorContext(&e)))
                }
            })?;

        let email = output
            .user_attributes()
            .iter()
            .find(|attr| attr.name() == "email")
            .and_then(|attr| attr.value())
            .map(str::to_string);

        Ok(Session {
            username: output.username().to_string(),
            email,
        })
    }

    async fn end_session(&self, token: &str) -> Result<()> {
        self.client
            .global_sign_out()
            .access_token(token)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_not_authorized_exception())
                {
                    AtomError::Unauthorized
                } else {
                    AtomError::Store(format!(
                        "Cognito GlobalSignOut error: {}",
                        DisplayErrorContext(&e)
                    ))
                }
            })?;
        Ok(())
    }
}

/// Access token from `Authorization: Bearer ...`, falling back to the
/// `access_token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all("Cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Gate for administrative routes.
pub async fn require_session<P: SessionProvider>(
    provider: &P,
    headers: &HeaderMap,
) -> Result<Session> {
    let token = extract_token(headers).ok_or(AtomError::Unauthorized)?;
    provider.current_session(&token).await
}

/// The request origin when it is allow-listed. Only these origins get a
/// credentialed CORS response.
pub fn get_cors_origin<'a>(request_origin: Option<&'a str>, allowed: &[String]) -> Option<&'a str> {
    let origin = request_origin?.trim_end_matches('/');
    allowed
        .iter()
        .any(|candidate| candidate == origin)
        .then_some(origin)
}

pub fn clear_cookie(name: &str) -> String {
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=None",
        name
    )
}
