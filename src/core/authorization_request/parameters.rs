use std::{fmt, str::FromStr};

use crate::core::object::TypedParameter;
use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

/// Implements [TypedParameter] for a newtype wrapping a string-valued parameter.
///
/// The wrapped type must deserialize from a JSON string and implement `ToString`.
macro_rules! typed_parameter {
    ($(#[$meta:meta])* $name:ident($inner:ty) = $key:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(pub $inner);

        impl TypedParameter for $name {
            const KEY: &'static str = $key;
        }

        impl TryFrom<Json> for $name {
            type Error = Error;

            fn try_from(value: Json) -> Result<Self, Self::Error> {
                Ok(serde_json::from_value(value).map(Self)?)
            }
        }

        impl From<$name> for Json {
            fn from(value: $name) -> Self {
                Json::String(value.0.to_string())
            }
        }
    };
}

typed_parameter!(ClientId(String) = "client_id");
typed_parameter!(Nonce(String) = "nonce");
typed_parameter!(RedirectUri(Url) = "redirect_uri");
typed_parameter!(ResponseUri(Url) = "response_uri");
typed_parameter!(
    /// `state` parameter, carrying the presentation session id.
    State(String) = "state"
);
typed_parameter!(PresentationDefinitionUri(Url) = "presentation_definition_uri");

impl Nonce {
    /// Generate a fresh random nonce.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

const DIRECT_POST: &str = "direct_post";
const DIRECT_POST_JWT: &str = "direct_post.jwt";
const QUERY: &str = "query";
const FRAGMENT: &str = "fragment";
const FORM_POST: &str = "form_post";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "String", from = "String")]
pub enum ResponseMode {
    /// The `direct_post` response mode as defined in OID4VP.
    DirectPost,
    /// The `direct_post.jwt` response mode as defined in OID4VP.
    DirectPostJwt,
    /// Response parameters are encoded in the query string of the redirect URI.
    Query,
    /// Response parameters are encoded in the fragment of the redirect URI.
    Fragment,
    /// Response parameters are auto-submitted by an HTML form to the redirect URI.
    FormPost,
    /// A ResponseMode that is unsupported by this library.
    Unsupported(String),
}

impl ResponseMode {
    /// Whether the wallet posts the response directly to the verifier's `response_uri`.
    pub fn is_direct_post(&self) -> bool {
        matches!(self, Self::DirectPost | Self::DirectPostJwt)
    }
}

impl TypedParameter for ResponseMode {
    const KEY: &'static str = "response_mode";
}

impl From<String> for ResponseMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            DIRECT_POST => ResponseMode::DirectPost,
            // Header values use identifier-style names.
            DIRECT_POST_JWT | "direct_post_jwt" => ResponseMode::DirectPostJwt,
            QUERY => ResponseMode::Query,
            FRAGMENT => ResponseMode::Fragment,
            FORM_POST => ResponseMode::FormPost,
            _ => ResponseMode::Unsupported(s),
        }
    }
}

impl From<ResponseMode> for String {
    fn from(s: ResponseMode) -> Self {
        match s {
            ResponseMode::DirectPost => DIRECT_POST.into(),
            ResponseMode::DirectPostJwt => DIRECT_POST_JWT.into(),
            ResponseMode::Query => QUERY.into(),
            ResponseMode::Fragment => FRAGMENT.into(),
            ResponseMode::FormPost => FORM_POST.into(),
            ResponseMode::Unsupported(u) => u,
        }
    }
}

impl FromStr for ResponseMode {
    type Err = Error;

    /// Parse a supported response mode, rejecting unknown values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ResponseMode::from(s.to_owned()) {
            ResponseMode::Unsupported(u) => bail!("unsupported response_mode: {u}"),
            supported => Ok(supported),
        }
    }
}

impl TryFrom<Json> for ResponseMode {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseMode> for Json {
    fn from(rm: ResponseMode) -> Self {
        String::from(rm).into()
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::DirectPost => DIRECT_POST,
            ResponseMode::DirectPostJwt => DIRECT_POST_JWT,
            ResponseMode::Query => QUERY,
            ResponseMode::Fragment => FRAGMENT,
            ResponseMode::FormPost => FORM_POST,
            ResponseMode::Unsupported(u) => u,
        }
        .fmt(f)
    }
}

impl Default for ResponseMode {
    fn default() -> Self {
        Self::Fragment
    }
}

const VP_TOKEN: &str = "vp_token";
const VP_TOKEN_ID_TOKEN: &str = "vp_token id_token";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(into = "String", from = "String")]
pub enum ResponseType {
    VpToken,
    VpTokenIdToken,
    Unsupported(String),
}

impl From<ResponseType> for String {
    fn from(rt: ResponseType) -> Self {
        match rt {
            ResponseType::VpToken => VP_TOKEN.into(),
            ResponseType::VpTokenIdToken => VP_TOKEN_ID_TOKEN.into(),
            ResponseType::Unsupported(s) => s,
        }
    }
}

impl From<String> for ResponseType {
    fn from(s: String) -> Self {
        match s.as_str() {
            VP_TOKEN => ResponseType::VpToken,
            VP_TOKEN_ID_TOKEN => ResponseType::VpTokenIdToken,
            _ => ResponseType::Unsupported(s),
        }
    }
}

impl TypedParameter for ResponseType {
    const KEY: &'static str = "response_type";
}

impl TryFrom<Json> for ResponseType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseType> for Json {
    fn from(rt: ResponseType) -> Self {
        Json::String(rt.into())
    }
}

#[derive(Debug, Clone)]
pub struct PresentationDefinition(pub Json);

impl TypedParameter for PresentationDefinition {
    const KEY: &'static str = "presentation_definition";
}

impl TryFrom<Json> for PresentationDefinition {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(value).map(Self)
    }
}

impl From<PresentationDefinition> for Json {
    fn from(value: PresentationDefinition) -> Self {
        value.0
    }
}
