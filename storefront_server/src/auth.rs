//! Bearer-token authentication.
//!
//! Access tokens are HS256 JWTs signed with the server's `SF_JWT_SECRET`. The claims carry the customer id (`sub`),
//! the caller's roles and an expiry time. Tokens are issued elsewhere (the storefront's login service); this server
//! only verifies them.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpMessage, HttpRequest};
use chrono::{DateTime, Utc};
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    AlgorithmExt,
    Claims,
    Header,
    TimeOptions,
    UntrustedToken,
    ValidationError,
};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_engine::settlement_objects::Principal;
use storefront_common::Secret;

use crate::errors::{AuthError, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The custom claims of an access token. The expiry travels in the standard `exp` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The customer id
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl JwtClaims {
    pub fn new(customer_id: &str, roles: &[Role]) -> Self {
        Self { sub: customer_id.to_string(), roles: roles.to_vec() }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn principal(&self) -> Principal {
        if self.has_role(Role::Admin) {
            Principal::admin(&self.sub)
        } else {
            Principal::customer(&self.sub)
        }
    }
}

/// Signs and verifies HS256 access tokens with a shared secret.
#[derive(Clone)]
pub struct JwtAuthority {
    key: Hs256Key,
}

impl std::fmt::Debug for JwtAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtAuthority(HS256, ****)")
    }
}

impl JwtAuthority {
    pub fn new(secret: Secret<String>) -> Self {
        Self { key: Hs256Key::new(secret.as_bytes()) }
    }

    pub fn issue_token(&self, claims: &JwtClaims, expires_at: DateTime<Utc>) -> Result<String, AuthError> {
        let header = Header::empty().with_token_type("JWT");
        let mut claims = Claims::new(claims.clone());
        claims.expiration = Some(expires_at);
        Hs256.token(&header, &claims, &self.key).map_err(|e| AuthError::ValidationError(format!("{e}")))
    }

    /// Checks the signature, the algorithm and the expiry of the token, and returns its claims.
    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let untrusted = UntrustedToken::new(token).map_err(|e| AuthError::PoorlyFormattedToken(format!("{e}")))?;
        let token = Hs256.validator::<JwtClaims>(&self.key).validate(&untrusted).map_err(validation_error)?;
        let claims = token.claims();
        claims.validate_expiration(&TimeOptions::default()).map_err(validation_error)?;
        Ok(claims.custom.clone())
    }
}

fn validation_error(e: ValidationError) -> AuthError {
    match e {
        ValidationError::Expired => AuthError::Expired,
        e => AuthError::ValidationError(format!("{e}")),
    }
}

/// Reads the bearer token off the request and verifies it. Claims that were already verified for this request (e.g.
/// by the ACL middleware) are reused.
pub fn authenticate(req: &HttpRequest) -> Result<JwtClaims, AuthError> {
    if let Some(claims) = req.extensions().get::<JwtClaims>() {
        return Ok(claims.clone());
    }
    let authority = req.app_data::<web::Data<JwtAuthority>>().ok_or_else(|| {
        error!("🔐️ No JwtAuthority has been registered with the app. All authenticated requests will fail.");
        AuthError::ValidationError("Authentication is not configured".into())
    })?;
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingToken)?;
    let claims = authority.verify(token).map_err(|e| {
        debug!("🔐️ Rejected access token. {e}");
        e
    })?;
    trace!("🔐️ Access token validated for {}", claims.sub);
    req.extensions_mut().insert(claims.clone());
    Ok(claims)
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map_err(ServerError::from))
    }
}
