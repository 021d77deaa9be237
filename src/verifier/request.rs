use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use super::error::VerifierError;
use crate::{
    core::{
        authorization_request::{parameters::ResponseMode, DEFAULT_AUTHORIZE_BASE_URL},
        presentation_definition::PresentationDefinition,
    },
    policy::{parse_policy_requests, PolicyExecutor, PolicyRequest},
    utils::NonEmptyVec,
};

/// An entry of `request_credentials`.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestedCredential {
    /// A bare credential type, verified with `vc_policies` only.
    Type(String),
    /// A credential type with additional policies.
    WithPolicies {
        credential: String,
        policies: Vec<PolicyRequest>,
    },
}

impl RequestedCredential {
    pub fn credential_type(&self) -> &str {
        match self {
            Self::Type(credential) | Self::WithPolicies { credential, .. } => credential,
        }
    }

    fn parse(
        index: usize,
        value: &Json,
        executor: &dyn PolicyExecutor,
    ) -> Result<Self, VerifierError> {
        match value {
            Json::String(credential) if !credential.is_empty() => {
                Ok(Self::Type(credential.clone()))
            }
            Json::Object(object) => {
                let credential = match object.get("credential") {
                    None | Some(Json::Null) => {
                        return Err(VerifierError::MissingCredentialName(index))
                    }
                    Some(Json::String(credential)) if !credential.is_empty() => credential.clone(),
                    Some(other) => {
                        return Err(VerifierError::InvalidRequestCredentials(format!(
                            "element {index}: `credential` must be a non-empty string, found {other}"
                        )))
                    }
                };

                let policies = match object.get("policies") {
                    None | Some(Json::Null) => {
                        return Err(VerifierError::MissingPolicies(credential))
                    }
                    Some(policies) => parse_policy_requests(policies, executor)?,
                };

                Ok(Self::WithPolicies {
                    credential,
                    policies,
                })
            }
            other => Err(VerifierError::InvalidRequestCredentials(format!(
                "element {index} must be a credential type or an object with `credential` and `policies`, found {other}"
            ))),
        }
    }
}

/// A parsed session-init request body.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub vp_policies: Vec<PolicyRequest>,
    pub vc_policies: Vec<PolicyRequest>,
    pub requested_credentials: NonEmptyVec<RequestedCredential>,
    pub presentation_definition: PresentationDefinition,
}

impl VerificationRequest {
    /// Parse a session-init body:
    ///
    /// ```json
    /// {
    ///   "vp_policies": ["signature", { "policy": "minimum-credentials", "args": 2 }],
    ///   "vc_policies": ["signature", "expired"],
    ///   "request_credentials": ["OpenBadgeCredential", { "credential": "VerifiableId", "policies": ["webhook"] }],
    ///   "presentation_definition": { ... }
    /// }
    /// ```
    ///
    /// Missing `vp_policies` or `vc_policies` default to the signature policy. Without an
    /// explicit `presentation_definition` one is synthesized from `request_credentials`.
    pub fn parse(body: &Json, executor: &dyn PolicyExecutor) -> Result<Self, VerifierError> {
        let Json::Object(body) = body else {
            return Err(VerifierError::InvalidRequest(
                "request body must be a JSON object".into(),
            ));
        };

        let vp_policies = policies_or_default(body, "vp_policies", executor)?;
        let vc_policies = policies_or_default(body, "vc_policies", executor)?;

        let requested_credentials = match body.get("request_credentials") {
            Some(Json::Array(elements)) => elements
                .iter()
                .enumerate()
                .map(|(index, element)| RequestedCredential::parse(index, element, executor))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(VerifierError::InvalidRequestCredentials(format!(
                    "expected an array, found {other}"
                )))
            }
            None => {
                return Err(VerifierError::InvalidRequestCredentials(
                    "`request_credentials` is required".into(),
                ))
            }
        };
        let requested_credentials = NonEmptyVec::maybe_new(requested_credentials).ok_or_else(|| {
            VerifierError::InvalidRequestCredentials("at least one credential must be requested".into())
        })?;

        let presentation_definition = match body.get("presentation_definition") {
            None | Some(Json::Null) => {
                PresentationDefinition::from_credential_types(&requested_types(&requested_credentials))
            }
            Some(definition) => PresentationDefinition::from_json(definition.clone())
                .map_err(|e| VerifierError::InvalidPresentationDefinition(format!("{e:#}")))?,
        };

        Ok(Self {
            vp_policies,
            vc_policies,
            requested_credentials,
            presentation_definition,
        })
    }

    /// Distinct requested credential types, in request order.
    pub fn requested_types(&self) -> NonEmptyVec<String> {
        requested_types(&self.requested_credentials)
    }

    /// Type-specific policies; a type requested twice keeps its last policies.
    pub fn specific_policies(&self) -> BTreeMap<String, Vec<PolicyRequest>> {
        self.requested_credentials
            .iter()
            .filter_map(|requested| match requested {
                RequestedCredential::WithPolicies {
                    credential,
                    policies,
                } => Some((credential.clone(), policies.clone())),
                RequestedCredential::Type(_) => None,
            })
            .collect()
    }
}

fn policies_or_default(
    body: &Map<String, Json>,
    key: &str,
    executor: &dyn PolicyExecutor,
) -> Result<Vec<PolicyRequest>, VerifierError> {
    match body.get(key) {
        None | Some(Json::Null) => Ok(vec![PolicyRequest::signature()]),
        Some(policies) => Ok(parse_policy_requests(policies, executor)?),
    }
}

fn requested_types(requested: &NonEmptyVec<RequestedCredential>) -> NonEmptyVec<String> {
    let mut types = NonEmptyVec::new(requested[0].credential_type().to_owned());
    for credential in requested.iter().skip(1) {
        types.push_distinct(credential.credential_type().to_owned());
    }
    types
}

/// Per-session options, passed as headers on session-init requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Wallet endpoint the authorization URL points at.
    pub authorize_base_url: String,
    pub response_mode: ResponseMode,
    pub success_redirect_uri: Option<String>,
    pub error_redirect_uri: Option<String>,
}

impl SessionOptions {
    pub fn new(authorize_base_url: impl Into<String>) -> Self {
        Self {
            authorize_base_url: authorize_base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_response_mode(mut self, response_mode: ResponseMode) -> Self {
        self.response_mode = response_mode;
        self
    }

    pub fn with_success_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.success_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_error_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.error_redirect_uri = Some(uri.into());
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            authorize_base_url: DEFAULT_AUTHORIZE_BASE_URL.into(),
            response_mode: ResponseMode::DirectPost,
            success_redirect_uri: None,
            error_redirect_uri: None,
        }
    }
}
