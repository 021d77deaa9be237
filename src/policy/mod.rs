//! Verification policies: typed requests, the registry and its executor interface.
//!
//! Policy algorithms themselves (signature checks, expiry, revocation...) are provided by the
//! application and registered on a [PolicyManager] at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::{presentation_submission::DecodedInput, response::DecodedPresentation};

mod registry;

pub use registry::{Policy, PolicyExecutor, PolicyManager};

/// Name of the built-in policy applied when a request does not name any.
pub const SIGNATURE_POLICY: &str = "signature";

/// A request to run the named policy, with optional policy-specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Json>,
}

impl PolicyRequest {
    pub fn new(policy: impl Into<String>, args: Option<Json>) -> Self {
        Self {
            policy: policy.into(),
            args,
        }
    }

    /// The default signature verification policy, without arguments.
    pub fn signature() -> Self {
        Self::new(SIGNATURE_POLICY, None)
    }
}

/// A policy as written by callers: either a bare name or an object naming the policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PolicySpec {
    Name(String),
    Object {
        #[serde(alias = "name")]
        policy: String,
        #[serde(default, alias = "arguments")]
        args: Option<Json>,
    },
}

impl From<PolicySpec> for PolicyRequest {
    fn from(spec: PolicySpec) -> Self {
        match spec {
            PolicySpec::Name(policy) => Self::new(policy, None),
            PolicySpec::Object { policy, args } => Self::new(policy, args),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyRequestError {
    #[error("policies must be given as a JSON array")]
    NotAnArray,
    #[error("policy #{index} must be a policy name or an object with a `policy` field: {value}")]
    InvalidShape { index: usize, value: Json },
    #[error("unknown policy `{0}`")]
    UnknownPolicy(String),
}

/// Parse an array of policy specs into policy requests, in order.
///
/// Every element is a bare policy name or `{ "policy": name, "args": value }` (`name` and
/// `arguments` are accepted as field names too). Each name must be registered on `executor`.
pub fn parse_policy_requests(
    value: &Json,
    executor: &dyn PolicyExecutor,
) -> Result<Vec<PolicyRequest>, PolicyRequestError> {
    let Json::Array(specs) = value else {
        return Err(PolicyRequestError::NotAnArray);
    };

    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let request: PolicyRequest = serde_json::from_value::<PolicySpec>(spec.clone())
                .map_err(|_| PolicyRequestError::InvalidShape {
                    index,
                    value: spec.clone(),
                })?
                .into();

            if !executor.is_registered(&request.policy) {
                return Err(PolicyRequestError::UnknownPolicy(request.policy));
            }
            Ok(request)
        })
        .collect()
}

/// What a policy is run against.
#[derive(Debug, Clone, Copy)]
pub enum PolicySubject<'a> {
    /// The presentation as a whole (`vp_policies`).
    Presentation(&'a DecodedPresentation),
    /// A single presented credential (`vc_policies` and type-specific policies).
    Credential(&'a DecodedInput),
}
