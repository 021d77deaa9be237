use anyhow::Error;
use serde_json::Value as Json;

use self::parameters::{PresentationSubmission, VpToken};

use super::{
    object::{ParsingErrorContext, UntypedObject},
    presentation_definition::PresentationDefinition,
    presentation_submission::{DecodedInput, SubmissionError},
};

pub mod parameters;

/// A wallet's answer to an authorization request: a `vp_token` and the
/// `presentation_submission` describing it.
#[derive(Debug, Clone)]
pub struct AuthorizationResponse(UntypedObject, VpToken, PresentationSubmission);

impl AuthorizationResponse {
    /// Parse an `application/x-www-form-urlencoded` response body.
    pub fn from_x_www_form_urlencoded(body: &[u8]) -> Result<Self, Error> {
        UntypedObject::from_x_www_form_urlencoded(body)?.try_into()
    }

    pub fn vp_token(&self) -> &VpToken {
        &self.1
    }

    pub fn presentation_submission(&self) -> &PresentationSubmission {
        &self.2
    }

    /// The `state` parameter, if the wallet echoed it back.
    pub fn state(&self) -> Option<String> {
        self.0.get::<parameters::State>()?.ok().map(|state| state.0)
    }

    /// Decode the presentation and extract the credentials answering `definition`.
    pub fn decode(
        &self,
        definition: &PresentationDefinition,
    ) -> Result<DecodedPresentation, SubmissionError> {
        let presentation = self
            .1
            .decode()
            .map_err(|e| SubmissionError::Decoding(format!("vp_token: {e:#}")))?;

        let vp_token = Json::from(self.1.clone());
        let credentials = self.2.find_inputs(definition, &vp_token)?;

        Ok(DecodedPresentation {
            vp_token,
            presentation,
            submission: self.2.clone(),
            credentials,
        })
    }
}

impl TryFrom<UntypedObject> for AuthorizationResponse {
    type Error = Error;

    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        let vp_token = value.get().parsing_error()?;
        let presentation_submission = value.get().parsing_error()?;
        Ok(Self(value, vp_token, presentation_submission))
    }
}

/// A submitted presentation, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPresentation {
    /// The `vp_token` as submitted.
    pub vp_token: Json,
    /// The presentation data model(s), JWT payloads expanded.
    pub presentation: Json,
    pub submission: PresentationSubmission,
    /// Every credential found through the descriptor map, in submission order.
    pub credentials: Vec<DecodedInput>,
}
