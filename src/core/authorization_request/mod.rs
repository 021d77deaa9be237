use std::ops::Deref;

use anyhow::{bail, Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use self::parameters::{
    ClientId, Nonce, PresentationDefinition, PresentationDefinitionUri, RedirectUri,
    ResponseMode, ResponseType, ResponseUri, State,
};

use super::object::{ParsingErrorContext, UntypedObject};

pub mod parameters;

/// The default base URL of a wallet's authorization endpoint.
pub const DEFAULT_AUTHORIZE_BASE_URL: &str = "openid4vp://authorize";

/// An authorization request issued by the verifier, in its decoded form.
///
/// The request carries the presentation definition (or a reference to it), the response
/// mode and the `state` binding the wallet's answer to a presentation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct AuthorizationRequestObject(
    UntypedObject,
    ClientId,
    ResponseMode,
    ResponseType,
    PresentationDefinitionIndirection,
    Url,
    State,
    Nonce,
);

/// A PresentationDefinition, passed by value or by reference
#[derive(Debug, Clone)]
pub enum PresentationDefinitionIndirection {
    ByValue(PresentationDefinition),
    ByReference(Url),
}

impl AuthorizationRequestObject {
    pub fn client_id(&self) -> &ClientId {
        &self.1
    }

    pub fn response_mode(&self) -> &ResponseMode {
        &self.2
    }

    pub fn response_type(&self) -> &ResponseType {
        &self.3
    }

    pub fn presentation_definition(&self) -> &PresentationDefinitionIndirection {
        &self.4
    }

    /// Uri to submit the response at.
    ///
    /// AKA [ResponseUri] or [RedirectUri] depending on [ResponseMode].
    pub fn return_uri(&self) -> &Url {
        &self.5
    }

    pub fn state(&self) -> &State {
        &self.6
    }

    pub fn nonce(&self) -> &Nonce {
        &self.7
    }

    /// Encode the request as query parameters, following the OID4VP parameter names.
    pub fn to_http_query_string(&self) -> Result<String> {
        self.0.to_http_query_string()
    }

    /// Encode as a URL string, using `authorize_base_url` as the wallet endpoint.
    ///
    /// ```
    /// # use openid4vp_verifier::core::authorization_request::AuthorizationRequestObject;
    /// # use serde_json::json;
    /// let request: AuthorizationRequestObject = serde_json::from_value(json!({
    ///     "client_id": "https://verifier.example.com/openid4vc/verify/s1",
    ///     "response_type": "vp_token",
    ///     "response_mode": "direct_post",
    ///     "response_uri": "https://verifier.example.com/openid4vc/verify/s1",
    ///     "presentation_definition_uri": "https://verifier.example.com/openid4vc/pd/s1",
    ///     "state": "s1",
    ///     "nonce": "n-0S6_WzA2Mj"
    /// })).unwrap();
    ///
    /// let url = request.to_url_string("openid4vp://authorize").unwrap();
    ///
    /// assert!(url.starts_with("openid4vp://authorize?"));
    /// assert!(url.contains("state=s1"));
    /// ```
    pub fn to_url_string(&self, authorize_base_url: &str) -> Result<String> {
        Ok(format!(
            "{authorize_base_url}?{}",
            self.to_http_query_string()?
        ))
    }
}

impl From<AuthorizationRequestObject> for UntypedObject {
    fn from(value: AuthorizationRequestObject) -> Self {
        value.0
    }
}

impl TryFrom<UntypedObject> for AuthorizationRequestObject {
    type Error = Error;

    fn try_from(value: UntypedObject) -> std::result::Result<Self, Self::Error> {
        let client_id = value.get().parsing_error()?;

        let redirect_uri = value.get::<RedirectUri>();
        let response_uri = value.get::<ResponseUri>();

        let (return_uri, response_mode) = match (
            redirect_uri,
            response_uri,
            value.get_or_default::<ResponseMode>().parsing_error()?,
        ) {
            (_, _, ResponseMode::Unsupported(m)) => {
                bail!("this 'response_mode' ({m}) is not currently supported")
            }
            (Some(_), Some(_), _) => {
                bail!("'response_uri' and 'redirect_uri' are mutually exclusive")
            }
            (_, None, response_mode @ (ResponseMode::DirectPost | ResponseMode::DirectPostJwt)) => {
                bail!("'response_uri' is required for this 'response_mode' ({response_mode})")
            }
            (_, Some(uri), response_mode @ (ResponseMode::DirectPost | ResponseMode::DirectPostJwt)) => {
                (uri.parsing_error()?.0, response_mode)
            }
            (Some(uri), None, response_mode) => (uri.parsing_error()?.0, response_mode),
            (None, _, response_mode) => {
                bail!("'redirect_uri' is required for this 'response_mode' ({response_mode})")
            }
        };

        let response_type: ResponseType = value.get().parsing_error()?;

        let pd_indirection = match (
            value.get::<PresentationDefinition>(),
            value.get::<PresentationDefinitionUri>(),
        ) {
            (None, None) => bail!(
                "one of 'presentation_definition' and 'presentation_definition_uri' are required"
            ),
            (Some(_), Some(_)) => {
                bail!("'presentation_definition' and 'presentation_definition_uri' are mutually exclusive")
            }
            (Some(by_value), None) => {
                PresentationDefinitionIndirection::ByValue(by_value.parsing_error()?)
            }
            (None, Some(by_reference)) => {
                PresentationDefinitionIndirection::ByReference(by_reference.parsing_error()?.0)
            }
        };

        let state = value.get().parsing_error()?;
        let nonce = value.get().parsing_error()?;

        Ok(Self(
            value,
            client_id,
            response_mode,
            response_type,
            pd_indirection,
            return_uri,
            state,
            nonce,
        ))
    }
}

impl Deref for AuthorizationRequestObject {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
