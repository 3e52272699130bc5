//! Sign-in against the hosted identity REST API

use std::time::Duration;

use chrono::{DateTime, Local};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BioTrackError;

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts";

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated user
#[derive(Debug, Clone)]
pub struct User {
    pub uid: String,
    pub email: String,
    #[allow(dead_code)]
    pub token: String,
    pub login_time: DateTime<Local>,
}

impl User {
    /// Local-only user for running without an identity provider
    pub fn offline() -> Self {
        Self {
            uid: "local".to_string(),
            email: String::new(),
            token: String::new(),
            login_time: Local::now(),
        }
    }
}

pub trait AuthProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, BioTrackError>;
    fn sign_up(&self, email: &str, password: &str) -> Result<(), BioTrackError>;
    fn reset_password(&self, email: &str) -> Result<(), BioTrackError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
}

/// Email/password accounts on the identity toolkit REST endpoints
pub struct IdentityToolkitAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IdentityToolkitAuth {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BioTrackError> {
        let client = Client::builder().timeout(AUTH_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}:{}?key={}", self.base_url, action, self.api_key)
    }

    /// POST a JSON body; returns the parsed body on HTTP 200, otherwise the
    /// provider's error message or `fallback`
    fn post<T: Serialize>(&self, action: &str, payload: &T, fallback: &str) -> Result<Value, BioTrackError> {
        let response = self
            .client
            .post(self.endpoint(action))
            .json(payload)
            .send()
            .map_err(|e| BioTrackError::Auth(format!("Network error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| BioTrackError::Auth(format!("Network error: {}", e)))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|_| BioTrackError::Auth(fallback.to_string()));
        }

        let message = error_message(&body).unwrap_or_else(|| fallback.to_string());
        warn!("{} rejected ({}): {}", action, status, message);
        Err(BioTrackError::Auth(message))
    }
}

impl AuthProvider for IdentityToolkitAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, BioTrackError> {
        let payload = CredentialsRequest {
            email,
            password,
            return_secure_token: true,
        };
        let body = self.post("signInWithPassword", &payload, "Login failed")?;
        let parsed: SignInResponse =
            serde_json::from_value(body).map_err(|_| BioTrackError::Auth("Login failed".to_string()))?;

        info!("Signed in as {}", parsed.email);
        Ok(User {
            uid: parsed.local_id,
            email: parsed.email,
            token: parsed.id_token,
            login_time: Local::now(),
        })
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<(), BioTrackError> {
        let payload = CredentialsRequest {
            email,
            password,
            return_secure_token: true,
        };
        self.post("signUp", &payload, "Registration failed")?;
        Ok(())
    }

    fn reset_password(&self, email: &str) -> Result<(), BioTrackError> {
        let payload = OobCodeRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        // The provider's reason is not shown for reset failures
        self.post("sendOobCode", &payload, "Failed to send reset email")
            .map_err(|e| match e {
                BioTrackError::Auth(msg) if msg.starts_with("Network error") => BioTrackError::Auth(msg),
                _ => BioTrackError::Auth("Failed to send reset email".to_string()),
            })?;
        Ok(())
    }
}

/// Extract `error.message` from a provider error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port, serve};

    fn provider(addr: &str) -> IdentityToolkitAuth {
        IdentityToolkitAuth::new(&format!("http://{}/v1/accounts", addr), "KEY").unwrap()
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"code":400,"message":"EMAIL_NOT_FOUND"}}"#).as_deref(),
            Some("EMAIL_NOT_FOUND")
        );
        assert_eq!(error_message(r#"{"error":{}}"#), None);
        assert_eq!(error_message("<html>"), None);
    }

    #[test]
    fn test_sign_in_success() {
        let body = r#"{"localId":"uid-42","email":"a@b.c","idToken":"tok","refreshToken":"r"}"#;
        let (addr, server) = serve(vec![(200, body.to_string())]);

        let user = provider(&addr).sign_in("a@b.c", "secret").unwrap();
        assert_eq!(user.uid, "uid-42");
        assert_eq!(user.email, "a@b.c");
        assert_eq!(user.token, "tok");

        let request = &server.join().unwrap()[0];
        assert!(request.starts_with("POST /v1/accounts:signInWithPassword?key=KEY "));
        assert!(request.contains(r#""returnSecureToken":true"#));
    }

    #[test]
    fn test_sign_in_rejected_uses_provider_message() {
        let body = r#"{"error":{"code":400,"message":"INVALID_PASSWORD"}}"#;
        let (addr, _server) = serve(vec![(400, body.to_string())]);

        match provider(&addr).sign_in("a@b.c", "wrong") {
            Err(BioTrackError::Auth(msg)) => assert_eq!(msg, "INVALID_PASSWORD"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sign_up_fallback_message() {
        let (addr, _server) = serve(vec![(500, "oops".to_string())]);
        match provider(&addr).sign_up("a@b.c", "pw") {
            Err(BioTrackError::Auth(msg)) => assert_eq!(msg, "Registration failed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_reset_password() {
        let (addr, server) = serve(vec![
            (200, r#"{"email":"a@b.c"}"#.to_string()),
            (400, r#"{"error":{"message":"EMAIL_NOT_FOUND"}}"#.to_string()),
        ]);
        let auth = provider(&addr);

        assert!(auth.reset_password("a@b.c").is_ok());
        match auth.reset_password("x@y.z") {
            Err(BioTrackError::Auth(msg)) => assert_eq!(msg, "Failed to send reset email"),
            other => panic!("unexpected result: {:?}", other),
        }

        let requests = server.join().unwrap();
        assert!(requests[0].contains(r#""requestType":"PASSWORD_RESET""#));
    }

    #[test]
    fn test_network_error() {
        match provider(&closed_port()).sign_in("a@b.c", "pw") {
            Err(BioTrackError::Auth(msg)) => assert!(msg.starts_with("Network error")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
