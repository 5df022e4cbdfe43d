use thiserror::Error;
use uuid::Uuid;

use crate::services::billing::BillingError;
use crate::services::store::StoreError;

/// Caller-facing errors of the decision engine.
///
/// Everything except `Storage` and `Subscription` is a request problem and
/// must not be retried as-is.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Actor and target are the same user")]
    SelfReference,

    #[error("User {actor} already decided on {target}")]
    DuplicateDecision { actor: Uuid, target: Uuid },

    #[error("User {reporter} already reported {reported}")]
    DuplicateReport { reporter: Uuid, reported: Uuid },

    #[error("Users are blocked")]
    Blocked,

    #[error("Super-like allowance exhausted")]
    QuotaExceeded,

    #[error("The other party has to send the first message")]
    NotYourTurn,

    #[error("Match expired before the first message was sent")]
    MatchExpired,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Subscription service error: {0}")]
    Subscription(#[from] BillingError),
}

impl CoreError {
    pub fn user_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "User", id }
    }

    pub fn match_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Match", id }
    }

    pub fn message_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Message", id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable machine-readable code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::SelfReference => "self_reference",
            CoreError::DuplicateDecision { .. } => "duplicate_decision",
            CoreError::DuplicateReport { .. } => "duplicate_report",
            CoreError::Blocked => "blocked",
            CoreError::QuotaExceeded => "quota_exceeded",
            CoreError::NotYourTurn => "not_your_turn",
            CoreError::MatchExpired => "match_expired",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::Storage(_) => "storage_unavailable",
            CoreError::Subscription(_) => "subscription_unavailable",
        }
    }

    /// Only collaborator failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Storage(_) | CoreError::Subscription(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_collaborator_errors_are_transient() {
        assert!(!CoreError::Blocked.is_transient());
        assert!(!CoreError::MatchExpired.is_transient());
        assert!(CoreError::Storage(StoreError::NotFound("x".into())).is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::NotYourTurn.code(), "not_your_turn");
        assert_eq!(CoreError::user_not_found(Uuid::nil()).code(), "not_found");
        assert_eq!(
            CoreError::user_not_found(Uuid::nil()).to_string(),
            format!("User not found: {}", Uuid::nil())
        );
    }
}
