use anyhow::{bail, Context, Result};
use base64::prelude::*;
use serde_json::Value as Json;

/// Decode the payload of a compact JWS, without verifying its signature.
///
/// SD-JWT disclosures (everything after the first `~`) are ignored.
pub fn decode_jwt_payload(token: &str) -> Result<Json> {
    let jws = token.split('~').next().unwrap_or_default();

    let mut parts = jws.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => bail!("not a compact JWS"),
    };

    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("JWT payload is not base64url encoded")?;

    let claims: Json = serde_json::from_slice(&bytes).context("JWT payload is not JSON")?;
    if !claims.is_object() {
        bail!("JWT payload is not a JSON object")
    }

    Ok(claims)
}

/// Return the value of `claim` if present, or the whole payload.
///
/// JWT-encoded credentials and presentations wrap their data model in a `vc` or `vp` claim.
pub fn unwrap_claim<'a>(payload: &'a Json, claim: &str) -> &'a Json {
    payload.get(claim).filter(|v| v.is_object()).unwrap_or(payload)
}

#[cfg(test)]
pub(crate) fn encode_unsigned_jwt(claims: &Json) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}
