use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Claim formats an input descriptor or presentation definition accepts, keyed by designation.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// Constraints on a claim format, e.g. the accepted signature algorithms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Format of a submitted claim, as named in descriptor maps and `format` objects.
///
/// See the [claim format registry](https://identity.foundation/claim-format-registry/#registry).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimFormatDesignation {
    #[serde(rename = "jwt")]
    Jwt,
    #[serde(rename = "jwt_vc")]
    JwtVc,
    #[serde(rename = "jwt_vp")]
    JwtVp,
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,
    #[serde(rename = "jwt_vp_json")]
    JwtVpJson,
    #[serde(rename = "ldp_vc")]
    LdpVc,
    #[serde(rename = "ldp_vp")]
    LdpVp,
    #[serde(rename = "vc+sd-jwt")]
    VcSdJwt,
    /// Designations this crate has no special handling for.
    #[serde(untagged)]
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn name(&self) -> &str {
        match self {
            Self::Jwt => "jwt",
            Self::JwtVc => "jwt_vc",
            Self::JwtVp => "jwt_vp",
            Self::JwtVcJson => "jwt_vc_json",
            Self::JwtVpJson => "jwt_vp_json",
            Self::LdpVc => "ldp_vc",
            Self::LdpVp => "ldp_vp",
            Self::VcSdJwt => "vc+sd-jwt",
            Self::Other(other) => other,
        }
    }

    /// Whether claims of this format are verifiable presentations wrapping credentials.
    pub fn is_presentation(&self) -> bool {
        matches!(self, Self::JwtVp | Self::JwtVpJson | Self::LdpVp)
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(name: &str) -> Self {
        serde_json::from_value(name.into()).unwrap_or_else(|_| Self::Other(name.to_owned()))
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
