//! Orchestrator-local error type — the five kinds from the signaling
//! error-handling design, expressed without a dependency cycle back into
//! `vane-common`'s HTTP-flavored [`vane_common::error::VaneError`].

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("incompatible-codecs")]
    IncompatibleCodecs,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<OrchestratorError> for vane_common::error::VaneError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::BadRequest(m) => Self::BadRequest(m),
            OrchestratorError::NotFound { resource } => Self::NotFound { resource },
            OrchestratorError::InvalidState(m) => Self::InvalidState(m),
            OrchestratorError::IncompatibleCodecs => Self::IncompatibleCodecs,
            OrchestratorError::Internal(e) => Self::Internal(e),
        }
    }
}

impl OrchestratorError {
    /// Machine-readable kind — the exact string the signaling ack's
    /// `error` field carries (`spec.md` §7).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad-request",
            Self::NotFound { .. } => "not-found",
            Self::InvalidState(_) => "invalid-state",
            Self::IncompatibleCodecs => "incompatible-codecs",
            Self::Internal(_) => "internal",
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vane_common::error::VaneError;

    #[test]
    fn incompatible_codecs_maps_to_conflict_kind() {
        let err: VaneError = OrchestratorError::IncompatibleCodecs.into();
        assert_eq!(err.kind(), "incompatible-codecs");
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_preserves_resource_name() {
        let err: VaneError = OrchestratorError::NotFound { resource: "producer".to_string() }.into();
        assert_eq!(err.kind(), "not-found");
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn kind_is_the_exact_ack_error_string_not_the_display_message() {
        let err = OrchestratorError::NotFound { resource: "producer".to_string() };
        assert_eq!(err.kind(), "not-found");
        assert_ne!(err.kind(), err.to_string());
    }
}
