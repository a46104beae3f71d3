//! Login handshake at the authorization service.
//!
//! The gateway relays the client's Basic payload as `X-Basic-Authorization`
//! (the `Authorization` header itself now carries a robot token). The
//! [`LoginCredentials`] extractor decodes it and checks it against the
//! credential store, failing closed on every error. It never falls through to
//! treating the request as anonymous.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use serde::Serialize;
use trust_core::{BasicCredentials, USER_TOKEN_LIFETIME, UserTokenIssuer, X_BASIC_AUTHORIZATION};

use super::credentials::{CredentialStore, VerifiedUser};
use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::headers::header_str;

/// Shared state of the authorization service.
pub struct AuthState {
    /// Credential backend
    pub store: Arc<dyn CredentialStore>,
    /// User token minting
    pub issuer: UserTokenIssuer,
}

/// A user whose relayed Basic credential matched the store.
#[derive(Debug, Clone)]
pub struct LoginCredentials(pub VerifiedUser);

impl FromRequestParts<Arc<AuthState>> for LoginCredentials {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(payload) = header_str(&parts.headers, X_BASIC_AUTHORIZATION) else {
            return Err(login_failed(None, AuthError::MissingTrustHeader));
        };

        let credentials = BasicCredentials::decode(payload)
            .map_err(|_| login_failed(None, AuthError::MalformedCredential))?;

        match state
            .store
            .verify(&credentials.username, &credentials.password)
            .await
        {
            Some(user) => Ok(Self(user)),
            None => Err(login_failed(
                Some(&credentials.username),
                AuthError::CredentialMismatch,
            )),
        }
    }
}

fn login_failed(username: Option<&str>, error: AuthError) -> AuthError {
    audit::emit(&AuditEvent::login_failed(username, &error));
    error
}

/// Login response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// The freshly minted user token.
    pub access_token: String,
    /// Always `"Bearer"`.
    pub token_type: &'static str,
    /// Seconds until expiry.
    pub expires_in: u64,
}

/// `POST <login_path>`: mint a user token for the verified user.
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    LoginCredentials(user): LoginCredentials,
) -> Result<Json<LoginResponse>, AuthError> {
    let token = state.issuer.issue(&user.username, &user.roles)?;
    audit::emit(&AuditEvent::login_succeeded(
        &user.username,
        token.claims().roles().len(),
    ));

    Ok(Json(LoginResponse {
        access_token: token.into_string(),
        token_type: "Bearer",
        expires_in: USER_TOKEN_LIFETIME.as_secs(),
    }))
}
