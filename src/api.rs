//! Transport-agnostic HTTP boundary of the verifier.
//!
//! Each operation maps a request (headers, path parameter, raw body) to an
//! [http::Response], so it can be mounted in any HTTP server.

use http::{
    header::{HeaderMap, CONTENT_TYPE},
    HeaderValue, Response, StatusCode,
};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::error;

use crate::{
    core::authorization_request::parameters::ResponseMode,
    verifier::{request::SessionOptions, RedirectDecision, Verifier, VerifierError},
};

pub const AUTHORIZE_BASE_URL_HEADER: &str = "authorizebaseurl";
pub const RESPONSE_MODE_HEADER: &str = "responsemode";
pub const SUCCESS_REDIRECT_URI_HEADER: &str = "successredirecturi";
pub const ERROR_REDIRECT_URI_HEADER: &str = "errorredirecturi";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct VerifierApi {
    verifier: Verifier,
}

impl VerifierApi {
    pub fn new(verifier: Verifier) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// `POST /openid4vc/verify`: create a presentation session.
    ///
    /// Answers with the authorization URL as plain text.
    pub async fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Response<String> {
        let initialized = async {
            let body: Json = serde_json::from_slice(body)
                .map_err(|e| VerifierError::InvalidRequest(format!("body is not JSON: {e}")))?;
            let request = self.verifier.parse_request(&body)?;
            let options = self.session_options(headers)?;
            self.verifier.initialize_session(request, options).await
        };

        match initialized.await {
            Ok(initialized) => text(StatusCode::OK, initialized.authorization_url),
            Err(e) => error_response(&e),
        }
    }

    fn session_options(&self, headers: &HeaderMap) -> Result<SessionOptions, VerifierError> {
        let authorize_base_url = header(headers, AUTHORIZE_BASE_URL_HEADER)?
            .unwrap_or_else(|| self.verifier.config().authorize_base_url.clone());
        let mut options = SessionOptions::new(authorize_base_url);

        if let Some(mode) = header(headers, RESPONSE_MODE_HEADER)? {
            let mode: ResponseMode = mode
                .parse()
                .map_err(|_| VerifierError::InvalidResponseMode(mode))?;
            options = options.with_response_mode(mode);
        }
        if let Some(uri) = header(headers, SUCCESS_REDIRECT_URI_HEADER)? {
            options = options.with_success_redirect_uri(uri);
        }
        if let Some(uri) = header(headers, ERROR_REDIRECT_URI_HEADER)? {
            options = options.with_error_redirect_uri(uri);
        }

        Ok(options)
    }

    /// `POST /openid4vc/verify/{state}`: a wallet's form-encoded token response.
    ///
    /// Answers `200` with the success redirect (possibly empty), or `400` with the error
    /// redirect or a failure summary.
    pub async fn submit(&self, state: &str, body: &[u8]) -> Response<String> {
        match self.verifier.submit(state, body).await {
            Ok(RedirectDecision::Success(redirect)) => text(StatusCode::OK, redirect),
            Ok(RedirectDecision::Failure(reason)) => text(StatusCode::BAD_REQUEST, reason),
            Err(e) => error_response(&e),
        }
    }

    /// `GET /openid4vc/session/{id}`
    pub async fn session(&self, id: &str) -> Response<String> {
        match self.verifier.describe(id).await {
            Ok(info) => json(&info),
            Err(e) => error_response(&e),
        }
    }

    /// `GET /openid4vc/pd/{id}`
    pub async fn presentation_definition(&self, id: &str) -> Response<String> {
        match self.verifier.presentation_definition(id).await {
            Ok(Some(definition)) => json(&definition),
            Ok(None) => text(
                StatusCode::NOT_FOUND,
                format!("no presentation definition for session `{id}`"),
            ),
            Err(e) => error_response(&e),
        }
    }

    /// `GET /openid4vc/policy-list`: registered policies and their descriptions.
    pub fn policy_list(&self) -> Response<String> {
        json(&self.verifier.policy_descriptions())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, VerifierError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(ToOwned::to_owned)
                .map_err(|_| VerifierError::InvalidRequest(format!("header `{name}` is not text")))
        })
        .transpose()
}

fn text(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

fn json(value: &impl Serialize) -> Response<String> {
    match serde_json::to_string(value) {
        Ok(body) => {
            let mut response = text(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            response
        }
        Err(e) => error_response(&VerifierError::Internal(e.into())),
    }
}

fn error_response(e: &VerifierError) -> Response<String> {
    let status = e.status_code();
    if status.is_server_error() {
        error!("{e:#}");
    }
    text(status, e.to_string())
}
