use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use serde_json::Value as Json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::VerifierServiceConfig,
    core::{
        authorization_request::{
            parameters::{
                ClientId, Nonce, PresentationDefinition as PresentationDefinitionParameter,
                PresentationDefinitionUri, RedirectUri, ResponseMode, ResponseType, ResponseUri,
                State,
            },
            AuthorizationRequestObject,
        },
        object::UntypedObject,
        presentation_definition::PresentationDefinition,
        response::AuthorizationResponse,
    },
    policy::PolicyExecutor,
    utils::substitute_session_id,
};

use self::{
    info::PresentationSessionInfo,
    lock::SessionLocks,
    request::{SessionOptions, VerificationRequest},
    session::{
        PresentationSession, PresentationSessionResult, SessionStore, SessionVerificationInfo,
    },
};

mod dispatch;
pub mod error;
pub mod info;
pub mod lock;
pub mod request;
pub mod session;

pub use dispatch::{PANIC_DETAIL, TIMEOUT_DETAIL};
pub use error::VerifierError;

/// Failure message when no policy outcome was recorded, e.g. for an undecodable token response.
pub const VERIFICATION_FAILED: &str = "Verification failed";

/// Orchestrates OpenID4VP presentation sessions: creates them, verifies wallet submissions
/// against the configured policies and reports their outcome.
#[derive(Clone)]
pub struct Verifier {
    session_store: Arc<dyn SessionStore>,
    policy_executor: Arc<dyn PolicyExecutor>,
    config: VerifierServiceConfig,
    locks: Arc<SessionLocks>,
}

/// A freshly created session and the URL to hand to the wallet.
#[derive(Debug, Clone)]
pub struct InitializedSession {
    pub session: PresentationSession,
    pub authorization_url: String,
}

/// What to answer the wallet after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Every policy passed; the success redirect, or an empty string.
    Success(String),
    /// The error redirect, or a human readable summary of the failure.
    Failure(String),
}

impl Verifier {
    /// Build a new verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    pub fn config(&self) -> &VerifierServiceConfig {
        &self.config
    }

    /// Parse a session-init request body against the registered policies.
    pub fn parse_request(&self, body: &Json) -> Result<VerificationRequest, VerifierError> {
        VerificationRequest::parse(body, self.policy_executor.as_ref())
    }

    /// Create a presentation session for `request`.
    ///
    /// The session and its verification info are stored together. The returned authorization
    /// URL is `options.authorize_base_url` followed by the encoded authorization request.
    pub async fn initialize_session(
        &self,
        request: VerificationRequest,
        options: SessionOptions,
    ) -> Result<InitializedSession, VerifierError> {
        if let ResponseMode::Unsupported(mode) = &options.response_mode {
            return Err(VerifierError::InvalidResponseMode(mode.clone()));
        }

        let id = Uuid::new_v4().to_string();
        let authorization_request =
            self.authorization_request(&id, &options.response_mode, &request.presentation_definition)?;
        let authorization_url = authorization_request
            .to_url_string(&options.authorize_base_url)
            .context("failed to encode authorization request")?;

        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.config.session_ttl())
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("session ttl is out of range"))?;

        let verification_info = SessionVerificationInfo {
            specific_policies: request.specific_policies(),
            vp_policies: request.vp_policies,
            vc_policies: request.vc_policies,
            success_redirect_uri: options.success_redirect_uri,
            error_redirect_uri: options.error_redirect_uri,
        };
        let session = PresentationSession {
            id: id.clone(),
            presentation_definition: request.presentation_definition,
            authorization_request,
            response_mode: options.response_mode,
            created_at,
            expires_at,
        };

        self.session_store
            .initiate(session.clone(), verification_info)
            .await
            .context("failed to store session")?;

        info!(
            session = %id,
            response_mode = %session.response_mode,
            descriptors = session.presentation_definition.input_descriptors().len(),
            "presentation session initialized"
        );

        Ok(InitializedSession {
            session,
            authorization_url,
        })
    }

    fn authorization_request(
        &self,
        id: &str,
        response_mode: &ResponseMode,
        definition: &PresentationDefinition,
    ) -> Result<AuthorizationRequestObject, VerifierError> {
        let return_uri = self
            .config
            .response_uri(id)
            .context("failed to build response uri")?;

        let mut params = UntypedObject::default();
        params.insert(ResponseType::VpToken);
        params.insert(ClientId(return_uri.to_string()));
        params.insert(response_mode.clone());
        if response_mode.is_direct_post() {
            params.insert(ResponseUri(return_uri));
        } else {
            params.insert(RedirectUri(return_uri));
        }
        params.insert(State(id.to_owned()));
        params.insert(Nonce::random());

        if self.config.presentation_definition_by_reference {
            let uri = self
                .config
                .presentation_definition_uri(id)
                .context("failed to build presentation definition uri")?;
            params.insert(PresentationDefinitionUri(uri));
        } else {
            params.insert(PresentationDefinitionParameter(definition.to_json()?));
        }

        Ok(AuthorizationRequestObject::try_from(params)
            .context("failed to build authorization request")?)
    }

    /// Verify a form-encoded token response (`vp_token`, `presentation_submission`) for
    /// session `id`.
    ///
    /// A token response that cannot be decoded yields a failed result without policy outcomes.
    /// The result replaces any earlier one.
    pub async fn verify_submission(
        &self,
        id: &str,
        body: &[u8],
    ) -> Result<PresentationSessionResult, VerifierError> {
        self.verify(id, || AuthorizationResponse::from_x_www_form_urlencoded(body))
            .await
            .map(|(result, _)| result)
    }

    /// Same as [Verifier::verify_submission], for already decoded response parameters.
    pub async fn verify_response(
        &self,
        id: &str,
        response: UntypedObject,
    ) -> Result<PresentationSessionResult, VerifierError> {
        self.verify(id, || AuthorizationResponse::try_from(response))
            .await
            .map(|(result, _)| result)
    }

    /// Verify a form-encoded token response and decide what to answer the wallet.
    ///
    /// Redirect templates have `$id` replaced by the session id.
    pub async fn submit(&self, id: &str, body: &[u8]) -> Result<RedirectDecision, VerifierError> {
        let (result, info) = self
            .verify(id, || AuthorizationResponse::from_x_www_form_urlencoded(body))
            .await?;

        if result.verification_result.as_bool() == Some(true) {
            let redirect = info
                .success_redirect_uri
                .map(|template| substitute_session_id(&template, id))
                .unwrap_or_default();
            return Ok(RedirectDecision::Success(redirect));
        }

        let failure = match info.error_redirect_uri {
            Some(template) => substitute_session_id(&template, id),
            None if result.policy_results.is_empty() => VERIFICATION_FAILED.to_owned(),
            None => format!(
                "Verification policies did not succeed: {}",
                result.failed_policies().join(", ")
            ),
        };
        Ok(RedirectDecision::Failure(failure))
    }

    async fn verify(
        &self,
        id: &str,
        parse: impl FnOnce() -> anyhow::Result<AuthorizationResponse>,
    ) -> Result<(PresentationSessionResult, SessionVerificationInfo), VerifierError> {
        let _guard = self.locks.lock(id).await;

        let Some(session) = self.session_store.get_session(id).await? else {
            debug!(session = %id, "submission for unknown or expired session");
            return Err(VerifierError::SessionNotFound(id.to_owned()));
        };

        let Some(info) = self.session_store.get_verification_info(id).await? else {
            error!(session = %id, "session has no verification info");
            return Err(VerifierError::MissingVerificationInfo(id.to_owned()));
        };

        let decoded = parse()
            .and_then(|response| match response.state() {
                Some(state) if state != id => bail!("state `{state}` does not match session"),
                _ => Ok(response),
            })
            .map_err(|e| format!("{e:#}"))
            .and_then(|response| {
                response
                    .decode(&session.presentation_definition)
                    .map_err(|e| e.to_string())
            });

        let result = match decoded {
            Ok(presentation) => {
                let deadline = Instant::now()
                    .checked_add(self.config.verification_timeout())
                    .ok_or_else(|| anyhow!("verification timeout is out of range"))?;
                let policy_results = dispatch::run_policies(
                    self.policy_executor.as_ref(),
                    &info,
                    &presentation,
                    deadline,
                )
                .await;
                PresentationSessionResult::from_policy_results(policy_results)
            }
            Err(reason) => {
                let error = VerifierError::TokenDecodeFailure(reason);
                warn!(session = %id, "{error}");
                PresentationSessionResult::decode_failure(error.to_string())
            }
        };

        let previous = match self.session_store.store_result(id, result.clone()).await {
            Ok(previous) => previous,
            Err(e) => {
                // Expired or removed while the policies ran.
                if self.session_store.get_session(id).await?.is_none() {
                    debug!(session = %id, "session ended during verification");
                    return Err(VerifierError::SessionNotFound(id.to_owned()));
                }
                return Err(e.context("failed to store verification result").into());
            }
        };
        if previous.is_some() {
            warn!(session = %id, "session was already verified, overwriting previous result");
        }

        info!(
            session = %id,
            verified = ?result.verification_result,
            failed = ?result.failed_policies(),
            "presentation verified"
        );

        Ok((result, info))
    }

    /// Public view of session `id`.
    pub async fn describe(&self, id: &str) -> Result<PresentationSessionInfo, VerifierError> {
        let Some(session) = self.session_store.get_session(id).await? else {
            return Err(VerifierError::SessionNotFound(id.to_owned()));
        };
        let result = self.session_store.get_result(id).await?;

        Ok(PresentationSessionInfo::new(session, result))
    }

    /// The presentation definition of session `id`, if it is live.
    pub async fn presentation_definition(
        &self,
        id: &str,
    ) -> Result<Option<PresentationDefinition>, VerifierError> {
        Ok(self
            .session_store
            .get_session(id)
            .await?
            .map(|session| session.presentation_definition))
    }

    /// Every registered policy, with its description.
    pub fn policy_descriptions(&self) -> BTreeMap<String, Option<String>> {
        self.policy_executor.list_policy_descriptions()
    }

    /// End session `id`. Returns `false` if there was no such session.
    pub async fn remove_session(&self, id: &str) -> Result<bool, VerifierError> {
        let _guard = self.locks.lock(id).await;
        Ok(self.session_store.remove_session(id).await?)
    }

    /// Drop every expired session from the store.
    pub async fn purge_expired(&self) -> Result<usize, VerifierError> {
        let purged = self.session_store.purge_expired().await?;
        if purged > 0 {
            info!(purged, "expired presentation sessions removed");
        }
        Ok(purged)
    }
}

impl Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("session_store", &self.session_store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder struct for [Verifier].
#[derive(Default)]
pub struct VerifierBuilder {
    session_store: Option<Arc<dyn SessionStore>>,
    policy_executor: Option<Arc<dyn PolicyExecutor>>,
    config: VerifierServiceConfig,
}

impl VerifierBuilder {
    /// Build the verifier.
    pub fn build(self) -> anyhow::Result<Verifier> {
        let Self {
            session_store,
            policy_executor,
            config,
        } = self;

        let Some(session_store) = session_store else {
            bail!("session store is required, see `with_session_store`")
        };

        let Some(policy_executor) = policy_executor else {
            bail!("policy executor is required, see `with_policy_executor`")
        };

        config.validate()?;

        Ok(Verifier {
            session_store,
            policy_executor,
            config,
            locks: Arc::new(SessionLocks::new()),
        })
    }

    /// Set the [SessionStore] that the [Verifier] will use to maintain session state across
    /// requests.
    pub fn with_session_store(mut self, session_store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(session_store);
        self
    }

    /// Set the registry the [Verifier] runs policies with.
    pub fn with_policy_executor(mut self, policy_executor: Arc<dyn PolicyExecutor>) -> Self {
        self.policy_executor = Some(policy_executor);
        self
    }

    pub fn with_config(mut self, config: VerifierServiceConfig) -> Self {
        self.config = config;
        self
    }
}
