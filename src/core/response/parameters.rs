pub use crate::core::authorization_request::parameters::State;
pub use crate::core::presentation_submission::PresentationSubmission;
use crate::core::{object::TypedParameter, util};

use anyhow::{bail, Error, Result};
use serde_json::{Map, Value as Json};

/// OpenID Connect for Verifiable Presentations specification defines `vp_token` parameter:
///
/// > JSON String or JSON object that MUST contain a single Verifiable Presentation or
/// > an array of JSON Strings and JSON objects each of them containing a Verifiable Presentations.
///
/// See: [OpenID.VP#section-6.1-2.2](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.1-2.2)
#[derive(Debug, Clone, PartialEq)]
pub enum VpToken {
    /// A compact JWT (or SD-JWT) presentation.
    Jwt(String),
    /// A presentation in JSON form, e.g. an `ldp_vp`.
    Object(Map<String, Json>),
    Many(Vec<VpToken>),
}

impl VpToken {
    /// Decoded view of the presentation(s), with JWT payloads expanded.
    ///
    /// For JWT presentations the `vp` claim is returned.
    pub fn decode(&self) -> Result<Json> {
        match self {
            Self::Jwt(jwt) => {
                let payload = util::decode_jwt_payload(jwt)?;
                Ok(util::unwrap_claim(&payload, "vp").clone())
            }
            Self::Object(map) => Ok(Json::Object(map.clone())),
            Self::Many(tokens) => tokens
                .iter()
                .map(Self::decode)
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
        }
    }
}

impl TypedParameter for VpToken {
    const KEY: &'static str = "vp_token";
}

impl TryFrom<Json> for VpToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::String(s) => Ok(Self::Jwt(s)),
            Json::Object(map) => Ok(Self::Object(map)),
            Json::Array(arr) => arr
                .into_iter()
                .map(Self::try_from)
                .collect::<Result<Vec<Self>, Self::Error>>()
                .map(Self::Many),
            _ => bail!("vp_token must be a string, an object or an array"),
        }
    }
}

impl From<VpToken> for Json {
    fn from(value: VpToken) -> Self {
        match value {
            VpToken::Jwt(s) => Json::String(s),
            VpToken::Object(map) => Json::Object(map),
            VpToken::Many(tokens) => Json::Array(tokens.into_iter().map(Self::from).collect()),
        }
    }
}
