//! Bearer-token extractor.
//!
//! Tokens are HS256 JWTs issued elsewhere; `sub` carries the user id.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token verification is not configured")]
    NotConfigured,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: "unauthorized".to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// Validates bearer tokens; registered as app data
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Sign a token for `user_id`; used by local tooling and tests
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    ttl: chrono::Duration,
    issuer: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id,
        exp,
        iss: issuer.map(str::to_string),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AuthError> {
    let verifier = req
        .app_data::<web::Data<TokenVerifier>>()
        .ok_or(AuthError::NotConfigured)?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    let claims = verifier.verify(token.trim())?;
    Ok(AuthUser(claims.sub))
}

impl FromRequest for AuthUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = authenticate(req);
        if let Err(e) = &result {
            tracing::debug!("Rejected request to {}: {}", req.path(), e);
        }
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const SECRET: &str = "test-secret";

    fn request_with(token: Option<String>) -> HttpRequest {
        let mut req = TestRequest::default().app_data(web::Data::new(TokenVerifier::new(SECRET, None)));
        if let Some(token) = token {
            req = req.insert_header((header::AUTHORIZATION, token));
        }
        req.to_http_request()
    }

    #[test]
    fn test_valid_token() {
        let user = Uuid::new_v4();
        let token = issue_token(SECRET, user, chrono::Duration::hours(1), None).unwrap();
        let req = request_with(Some(format!("Bearer {}", token)));
        assert_eq!(authenticate(&req).unwrap(), AuthUser(user));
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_token("other", Uuid::new_v4(), chrono::Duration::hours(1), None).unwrap();
        let req = request_with(Some(format!("Bearer {}", token)));
        assert!(matches!(authenticate(&req), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token() {
        let token = issue_token(SECRET, Uuid::new_v4(), chrono::Duration::hours(-2), None).unwrap();
        let req = request_with(Some(format!("Bearer {}", token)));
        assert!(matches!(authenticate(&req), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_missing_header() {
        let req = request_with(None);
        assert!(matches!(authenticate(&req), Err(AuthError::MissingToken)));

        let req = request_with(Some("Basic abc".to_string()));
        assert!(matches!(authenticate(&req), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_issuer_checked() {
        let verifier = TokenVerifier::new(SECRET, Some("tandem-auth"));
        let user = Uuid::new_v4();

        let good = issue_token(SECRET, user, chrono::Duration::hours(1), Some("tandem-auth")).unwrap();
        assert_eq!(verifier.verify(&good).unwrap().sub, user);

        let bad = issue_token(SECRET, user, chrono::Duration::hours(1), Some("elsewhere")).unwrap();
        assert!(verifier.verify(&bad).is_err());
    }
}
