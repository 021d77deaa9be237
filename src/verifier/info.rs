use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{PolicyResult, PresentationSession, PresentationSessionResult};
use crate::core::presentation_definition::PresentationDefinition;

/// Public view of a presentation session.
///
/// Never carries the configured policies or redirect templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSessionInfo {
    pub id: String,
    pub presentation_definition: PresentationDefinition,
    pub expires_at: DateTime<Utc>,
    /// `None` until a submission has been verified.
    pub verification_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_results: Option<Vec<PolicyResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PresentationSessionInfo {
    pub fn new(session: PresentationSession, result: Option<PresentationSessionResult>) -> Self {
        let (verification_result, policy_results, error) = match result {
            Some(result) => (
                result.verification_result.as_bool(),
                Some(result.policy_results),
                result.error,
            ),
            None => (None, None, None),
        };

        Self {
            id: session.id,
            presentation_definition: session.presentation_definition,
            expires_at: session.expires_at,
            verification_result,
            policy_results,
            error,
        }
    }
}
