use http::StatusCode;

use crate::policy::PolicyRequestError;

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed policy request: {0}")]
    MalformedPolicyRequest(#[from] PolicyRequestError),

    #[error("invalid request_credentials: {0}")]
    InvalidRequestCredentials(String),

    #[error("request_credentials[{0}]: missing `credential` name")]
    MissingCredentialName(usize),

    #[error("request_credentials: missing `policies` for credential `{0}`")]
    MissingPolicies(String),

    #[error("invalid presentation definition: {0}")]
    InvalidPresentationDefinition(String),

    #[error("invalid response mode: {0}")]
    InvalidResponseMode(String),

    #[error("State parameter doesn't refer to an existing session, or session expired")]
    SessionNotFound(String),

    /// Verification info is stored together with its session, so this is never expected.
    #[error("no verification info stored for session `{0}`")]
    MissingVerificationInfo(String),

    #[error("failed to decode token response: {0}")]
    TokenDecodeFailure(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl VerifierError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingVerificationInfo(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
