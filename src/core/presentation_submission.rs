use super::{
    credential_format::*, object::TypedParameter, presentation_definition::PresentationDefinition,
    util,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions are objects embedded within target
/// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) negotiation
/// formats that express how the inputs presented as proofs to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements specified in a [PresentationDefinition].
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: String,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

impl PresentationSubmission {
    pub fn new(id: String, definition_id: String, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Return the id of the presentation submission.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the definition id of the presentation submission.
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &[DescriptorMap] {
        &self.descriptor_map
    }

    /// Find every claim referenced by the descriptor map in `vp_token`, decoded.
    ///
    /// The submission must answer `definition`: each descriptor map entry must refer to one of
    /// its input descriptors and match at least one value, and every input descriptor must be
    /// answered by at least one claim.
    pub fn find_inputs(
        &self,
        definition: &PresentationDefinition,
        vp_token: &Json,
    ) -> Result<Vec<DecodedInput>, SubmissionError> {
        if self.definition_id != *definition.id() {
            return Err(SubmissionError::DefinitionMismatch {
                expected: definition.id().clone(),
                found: self.definition_id.clone(),
            });
        }

        let input_descriptors = definition.input_descriptors_map();

        let mut inputs = Vec::new();
        for descriptor_map in &self.descriptor_map {
            if !input_descriptors.contains_key(descriptor_map.id.as_str()) {
                return Err(SubmissionError::UndefinedInputDescriptor(
                    descriptor_map.id.clone(),
                ));
            }
            descriptor_map.find_inputs(vp_token, &mut inputs)?;
        }

        if let Some(unanswered) = definition
            .input_descriptors()
            .iter()
            .find(|descriptor| !inputs.iter().any(|i| i.descriptor_id == descriptor.id()))
        {
            return Err(SubmissionError::UnansweredInputDescriptor(
                unanswered.id().to_owned(),
            ));
        }

        Ok(inputs)
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = anyhow::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        // Some wallets post the submission as a JSON-encoded string.
        let raw = match raw {
            Json::String(s) => serde_json::from_str(&s)?,
            other => other,
        };
        serde_json::from_value(raw).map_err(Into::into)
    }
}

impl TryFrom<PresentationSubmission> for Json {
    type Error = serde_json::Error;

    fn try_from(value: PresentationSubmission) -> Result<Self, Self::Error> {
        serde_json::to_value(value)
    }
}

/// Descriptor Maps are objects used to describe the information a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) provides to a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        path: JsonPath,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path,
            path_nested: None,
        }
    }

    /// Collect the claims this descriptor map points at in `value`.
    ///
    /// A nested path is evaluated against the decoded claim it is nested in. A presentation
    /// without a nested path contributes every credential it embeds.
    ///
    /// See: <https://identity.foundation/presentation-exchange/spec/v2.0.0/#processing-of-submission-entries>
    fn find_inputs(
        &self,
        value: &Json,
        inputs: &mut Vec<DecodedInput>,
    ) -> Result<(), SubmissionError> {
        let nodes = self.path.query(value).all();
        if nodes.is_empty() {
            return Err(SubmissionError::PathNotFound {
                id: self.id.clone(),
                path: self.path.to_string(),
            });
        }

        for node in nodes {
            let decoded = DecodedInput::decode(&self.id, self.format.clone(), node)?;

            match &self.path_nested {
                Some(nested) => {
                    // Nested paths are relative either to the token payload or to the
                    // presentation it wraps.
                    let root = if nested.path.query(&decoded.payload).all().is_empty() {
                        &decoded.claims
                    } else {
                        &decoded.payload
                    };
                    nested.find_inputs(root, inputs)?;
                }
                None if self.format.is_presentation() => {
                    let credentials = match decoded.claims.get("verifiableCredential") {
                        Some(Json::Array(credentials)) => credentials.clone(),
                        Some(credential) => vec![credential.clone()],
                        None => Vec::new(),
                    };
                    for credential in &credentials {
                        let format = match credential {
                            Json::String(_) => ClaimFormatDesignation::JwtVcJson,
                            _ => ClaimFormatDesignation::LdpVc,
                        };
                        inputs.push(DecodedInput::decode(&self.id, format, credential)?);
                    }
                }
                None => inputs.push(decoded),
            }
        }

        Ok(())
    }
}

/// A claim found through a descriptor map, with its decoded content.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInput {
    /// Input descriptor id.
    pub descriptor_id: String,

    /// Claim format.
    pub format: ClaimFormatDesignation,

    /// The claim as submitted, e.g. a compact JWT string.
    pub raw: Json,

    /// Full decoded payload (the JWT claims set for JWT-encoded claims).
    pub payload: Json,

    /// Credential or presentation data model, i.e. the `vc`/`vp` claim when present.
    pub claims: Json,
}

impl DecodedInput {
    fn decode(
        descriptor_id: &str,
        format: ClaimFormatDesignation,
        raw: &Json,
    ) -> Result<Self, SubmissionError> {
        let payload = match raw {
            Json::String(token) => util::decode_jwt_payload(token)
                .map_err(|e| SubmissionError::Decoding(format!("{descriptor_id}: {e:#}")))?,
            Json::Object(_) => raw.clone(),
            _ => {
                return Err(SubmissionError::Decoding(format!(
                    "{descriptor_id}: claim is neither a JWT nor a JSON object"
                )))
            }
        };

        let claim = if format.is_presentation() { "vp" } else { "vc" };
        let claims = util::unwrap_claim(&payload, claim).clone();

        Ok(Self {
            descriptor_id: descriptor_id.to_owned(),
            format,
            raw: raw.clone(),
            payload,
            claims,
        })
    }

    /// The most specific type of the claim: the last entry of `type`, or `vct` for SD-JWT VCs.
    pub fn credential_type(&self) -> Option<&str> {
        match self.claims.get("type") {
            Some(Json::Array(types)) => types.iter().rev().find_map(Json::as_str),
            Some(Json::String(t)) => Some(t.as_str()),
            _ => self.claims.get("vct").and_then(Json::as_str),
        }
    }
}

/// Presentation submission error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The submission answers another presentation definition.
    #[error("presentation submission answers definition `{found}`, expected `{expected}`")]
    DefinitionMismatch { expected: String, found: String },

    /// Submission contains inputs that are not defined in the presentation
    /// definition.
    #[error("undefined input descriptor: {0}")]
    UndefinedInputDescriptor(String),

    /// No submitted claim answers this input descriptor of the definition.
    #[error("no claim submitted for input descriptor `{0}`")]
    UnansweredInputDescriptor(String),

    /// A descriptor map path matched nothing in the `vp_token`.
    #[error("descriptor map `{id}`: path {path} does not match any value")]
    PathNotFound { id: String, path: String },

    /// Claim decoding failed.
    #[error("claim decoding failed: {0}")]
    Decoding(String),
}
