//! Login, logout and password change against the auth service.
//!
//! These calls feed the shared [`Session`]: a successful login installs the
//! decoded credentials, and logout clears them whether or not the server
//! accepts the refresh-token blacklist request.

use std::sync::Arc;

use gregor_core::envelope::{error_message, EnvelopeError};
use gregor_core::types::display_value;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::gateway::{bearer_headers, join_url, GatewayError};
use crate::session::{Credentials, Session};
use crate::transport::{ApiRequest, HttpTransport};

pub const LOGIN_PATH: &str = "api/auth/login/";
pub const LOGOUT_PATH: &str = "api/auth/logout/";
pub const CHANGE_PASSWORD_PATH: &str = "api/auth/change_password/";

/// Message used when a login failure carries no usable body.
pub const LOGIN_FAILED: &str = "Login failed. Please try again.";

#[derive(Debug, Deserialize)]
struct TokenPair {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Body of a password change request.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// Client for the auth endpoints.
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    session: Arc<Session>,
    transport: Arc<dyn HttpTransport>,
}

impl AuthClient {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<Session>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            session,
            transport,
        }
    }

    /// Exchanges credentials for a token pair and installs it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Api`] with the server's `detail` (or
    /// [`LOGIN_FAILED`]) on rejection, and [`GatewayError::Session`] if the
    /// returned access token cannot be decoded.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Arc<Credentials>, GatewayError> {
        let request = ApiRequest::post(
            join_url(&self.base_url, LOGIN_PATH),
            json!({"username": username, "password": password}),
        );
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(GatewayError::Api {
                status: response.status,
                message: login_error_message(&response.body),
            });
        }
        let pair: TokenPair = serde_json::from_value(response.body).map_err(EnvelopeError::from)?;
        let credentials = self.session.install(Credentials::new(pair.access, pair.refresh)?);
        info!(user = ?credentials.claims().user_id, "logged in");
        Ok(credentials)
    }

    /// Clears the session, then asks the server to blacklist the refresh
    /// token. The local session is gone even when that request fails.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the blacklist request fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let Some(credentials) = self.session.clear() else {
            return Ok(());
        };
        let Some(refresh) = credentials.refresh_token() else {
            info!("logged out");
            return Ok(());
        };
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", credentials.access_token())) {
            headers.insert(http::header::AUTHORIZATION, value);
        }
        let request = ApiRequest::post(join_url(&self.base_url, LOGOUT_PATH), json!({"refresh": refresh}))
            .with_headers(headers);
        let outcome = match self.transport.send(request).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(GatewayError::Api {
                status: response.status,
                message: error_message(&response.body),
            }),
            Err(e) => Err(e.into()),
        };
        match &outcome {
            Ok(()) => info!("logged out"),
            Err(e) => warn!(error = %e, "token blacklist rejected; logged out locally"),
        }
        outcome
    }

    /// Changes the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Session`] when signed out, or
    /// [`GatewayError::Api`] carrying the server's field errors.
    #[instrument(skip_all)]
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), GatewayError> {
        let body = serde_json::to_value(change).map_err(EnvelopeError::from)?;
        let request = ApiRequest::post(join_url(&self.base_url, CHANGE_PASSWORD_PATH), body)
            .with_headers(bearer_headers(&self.session)?);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            if response.status == StatusCode::UNAUTHORIZED {
                self.session.clear();
            }
            return Err(GatewayError::Api {
                status: response.status,
                message: password_error_message(&response.body),
            });
        }
        info!("Password changed successfully");
        Ok(())
    }
}

/// `detail`, else the whole object as JSON, else a bare string body.
fn login_error_message(body: &Value) -> String {
    match body {
        Value::Object(map) => map
            .get("detail")
            .and_then(Value::as_str)
            .map_or_else(|| body.to_string(), str::to_string),
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => LOGIN_FAILED.to_string(),
    }
}

/// `detail`, else `field: e1, e2` pairs joined with `" | "`.
fn password_error_message(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            if let Some(detail) = map.get("detail").and_then(Value::as_str) {
                return detail.to_string();
            }
            map.iter()
                .map(|(field, errors)| {
                    let text = match errors {
                        Value::Array(items) => items
                            .iter()
                            .map(display_value)
                            .collect::<Vec<_>>()
                            .join(", "),
                        other => display_value(other),
                    };
                    format!("{field}: {text}")
                })
                .collect::<Vec<_>>()
                .join(" | ")
        }
        _ => "Something went wrong".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;
    use crate::testing::{token, MockTransport};
    use crate::transport::TransportError;

    fn client() -> (AuthClient, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let auth = AuthClient::new("http://auth.test", Arc::new(Session::new()), transport.clone());
        (auth, transport)
    }

    #[tokio::test]
    async fn login_installs_decoded_credentials() {
        let (auth, transport) = client();
        let access = token(&json!({"user_id": 5, "username": "curator"}));
        transport.push_json(200, json!({"access": access, "refresh": "r1"}));

        let creds = auth.login("curator", "secret").await.unwrap();
        assert_eq!(creds.claims().username.as_deref(), Some("curator"));
        assert_eq!(auth.session.current().unwrap().refresh_token(), Some("r1"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://auth.test/api/auth/login/");
        assert_eq!(sent.body, Some(json!({"username": "curator", "password": "secret"})));
        assert!(sent.authorization().is_none());
    }

    #[tokio::test]
    async fn login_failure_uses_detail() {
        let (auth, transport) = client();
        transport.push_json(401, json!({"detail": "No active account found with the given credentials"}));
        let err = auth.login("x", "y").await.unwrap_err();
        assert_eq!(err.to_string(), "No active account found with the given credentials");
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(auth.session.current().is_none());
    }

    #[tokio::test]
    async fn login_with_undecodable_token_fails() {
        let (auth, transport) = client();
        transport.push_json(200, json!({"access": "garbage", "refresh": "r"}));
        let err = auth.login("x", "y").await.unwrap_err();
        assert!(matches!(err, GatewayError::Session(SessionError::InvalidToken(_))));
        assert!(auth.session.current().is_none());
    }

    #[tokio::test]
    async fn logout_posts_refresh_token() {
        let (auth, transport) = client();
        let access = token(&json!({"user_id": 5}));
        auth.session.install(Credentials::new(access.clone(), Some("r1".into())).unwrap());
        transport.push_json(205, Value::Null);

        auth.logout().await.unwrap();
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://auth.test/api/auth/logout/");
        assert_eq!(sent.body, Some(json!({"refresh": "r1"})));
        assert_eq!(sent.authorization(), Some(format!("Bearer {access}").as_str()));
        assert!(auth.session.current().is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_even_when_rejected() {
        let (auth, transport) = client();
        auth.session
            .install(Credentials::new(token(&json!({})), Some("r1".into())).unwrap());
        transport.push_error(TransportError::Network("connection reset".into()));

        assert!(auth.logout().await.is_err());
        assert!(auth.session.current().is_none());
    }

    #[tokio::test]
    async fn logout_when_signed_out_is_a_no_op() {
        let (auth, transport) = client();
        auth.logout().await.unwrap();
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn change_password_sends_bearer_and_joins_field_errors() {
        let (auth, transport) = client();
        let access = token(&json!({"user_id": 5}));
        auth.session.install(Credentials::new(access.clone(), None).unwrap());
        transport.push_json(
            400,
            json!({"old_password": ["Old password is not correct"], "new_password": ["Too short.", "Too common."]}),
        );

        let change = PasswordChange {
            old_password: "a".into(),
            new_password: "b".into(),
            confirm_new_password: "b".into(),
        };
        let err = auth.change_password(&change).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "old_password: Old password is not correct | new_password: Too short., Too common."
        );
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://auth.test/api/auth/change_password/");
        assert_eq!(sent.authorization(), Some(format!("Bearer {access}").as_str()));
        assert_eq!(
            sent.body,
            Some(json!({"old_password": "a", "new_password": "b", "confirm_new_password": "b"}))
        );
    }

    #[test]
    fn login_error_fallbacks() {
        assert_eq!(login_error_message(&Value::Null), LOGIN_FAILED);
        assert_eq!(login_error_message(&json!("Bad gateway")), "Bad gateway");
        assert_eq!(login_error_message(&json!({"non_field_errors": ["x"]})), r#"{"non_field_errors":["x"]}"#);
        assert_eq!(password_error_message(&json!("oops")), "Something went wrong");
    }
}
