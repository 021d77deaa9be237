use std::{collections::BTreeMap, collections::HashMap, fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::RwLock;

use crate::{
    core::{
        authorization_request::{parameters::ResponseMode, AuthorizationRequestObject},
        presentation_definition::PresentationDefinition,
    },
    policy::PolicyRequest,
};

/// An in-flight presentation exchange.
#[derive(Debug, Clone)]
pub struct PresentationSession {
    pub id: String,
    pub presentation_definition: PresentationDefinition,
    pub authorization_request: AuthorizationRequestObject,
    pub response_mode: ResponseMode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PresentationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Policies and redirects configured for a session, stored alongside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionVerificationInfo {
    /// Run once against the presentation as a whole.
    pub vp_policies: Vec<PolicyRequest>,
    /// Run against every presented credential.
    pub vc_policies: Vec<PolicyRequest>,
    /// Run in addition to `vc_policies` against credentials of the given type.
    pub specific_policies: BTreeMap<String, Vec<PolicyRequest>>,
    /// Redirect on success, `$id` is replaced by the session id.
    pub success_redirect_uri: Option<String>,
    /// Redirect on failure, `$id` is replaced by the session id.
    pub error_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerificationResult {
    #[default]
    NotVerified,
    Passed,
    Failed,
}

impl VerificationResult {
    /// `None` until a submission has been verified.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::NotVerified => None,
            Self::Passed => Some(true),
            Self::Failed => Some(false),
        }
    }
}

/// What a policy outcome refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum PolicyTarget {
    Presentation,
    #[serde(rename_all = "camelCase")]
    Credential {
        descriptor_id: String,
        credential_type: Option<String>,
    },
}

/// Outcome of a single policy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    pub policy: String,
    #[serde(flatten)]
    pub target: PolicyTarget,
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PolicyResult {
    pub fn success(policy: String, target: PolicyTarget, result: Json) -> Self {
        Self {
            policy,
            target,
            is_success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(policy: String, target: PolicyTarget, error: String) -> Self {
        Self {
            policy,
            target,
            is_success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Result of the last verification attempt of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresentationSessionResult {
    pub verification_result: VerificationResult,
    pub policy_results: Vec<PolicyResult>,
    /// Protocol-level failure, e.g. an undecodable token response.
    pub error: Option<String>,
}

impl PresentationSessionResult {
    pub fn from_policy_results(policy_results: Vec<PolicyResult>) -> Self {
        let verification_result = if policy_results.iter().all(|r| r.is_success) {
            VerificationResult::Passed
        } else {
            VerificationResult::Failed
        };

        Self {
            verification_result,
            policy_results,
            error: None,
        }
    }

    pub fn decode_failure(error: String) -> Self {
        Self {
            verification_result: VerificationResult::Failed,
            policy_results: Vec::new(),
            error: Some(error),
        }
    }

    /// Names of the failed policies, without duplicates, in execution order.
    pub fn failed_policies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for result in self.policy_results.iter().filter(|r| !r.is_success) {
            if !names.contains(&result.policy.as_str()) {
                names.push(&result.policy);
            }
        }
        names
    }
}

/// Storage interface for presentation sessions.
///
/// Expired sessions are never returned.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync {
    /// Store a new session together with its verification info.
    async fn initiate(
        &self,
        session: PresentationSession,
        info: SessionVerificationInfo,
    ) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<PresentationSession>>;

    async fn get_verification_info(&self, id: &str) -> Result<Option<SessionVerificationInfo>>;

    /// Record the result of a verification attempt, returning the one it replaces.
    async fn store_result(
        &self,
        id: &str,
        result: PresentationSessionResult,
    ) -> Result<Option<PresentationSessionResult>>;

    async fn get_result(&self, id: &str) -> Result<Option<PresentationSessionResult>>;

    /// Returns `false` if there was no such session.
    async fn remove_session(&self, id: &str) -> Result<bool>;

    /// Remove every expired session, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct Entries {
    sessions: HashMap<String, PresentationSession>,
    verification_info: HashMap<String, SessionVerificationInfo>,
    results: HashMap<String, PresentationSessionResult>,
}

impl Entries {
    fn remove(&mut self, id: &str) -> bool {
        self.verification_info.remove(id);
        self.results.remove(id);
        self.sessions.remove(id).is_some()
    }
}

/// A local in-memory store.
///
/// # Warning
/// This in-memory store will not work for a distributed deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` names a live session, evicting it if it expired.
    async fn is_live(&self, id: &str) -> bool {
        let now = Utc::now();
        let expired = match self.entries.read().await.sessions.get(id) {
            None => return false,
            Some(session) => session.is_expired(now),
        };

        if expired {
            self.entries.write().await.remove(id);
        }
        !expired
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn initiate(
        &self,
        session: PresentationSession,
        info: SessionVerificationInfo,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.sessions.contains_key(&session.id) {
            bail!("session `{}` already exists", session.id)
        }
        entries.verification_info.insert(session.id.clone(), info);
        entries.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<PresentationSession>> {
        if !self.is_live(id).await {
            return Ok(None);
        }
        Ok(self.entries.read().await.sessions.get(id).cloned())
    }

    async fn get_verification_info(&self, id: &str) -> Result<Option<SessionVerificationInfo>> {
        if !self.is_live(id).await {
            return Ok(None);
        }
        Ok(self.entries.read().await.verification_info.get(id).cloned())
    }

    async fn store_result(
        &self,
        id: &str,
        result: PresentationSessionResult,
    ) -> Result<Option<PresentationSessionResult>> {
        let mut entries = self.entries.write().await;
        if !entries.sessions.contains_key(id) {
            bail!("session `{id}` not found")
        }
        Ok(entries.results.insert(id.to_owned(), result))
    }

    async fn get_result(&self, id: &str) -> Result<Option<PresentationSessionResult>> {
        if !self.is_live(id).await {
            return Ok(None);
        }
        Ok(self.entries.read().await.results.get(id).cloned())
    }

    async fn remove_session(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let expired: Vec<String> = entries
            .sessions
            .values()
            .filter(|session| session.is_expired(now))
            .map(|session| session.id.clone())
            .collect();

        for id in &expired {
            entries.remove(id);
        }
        Ok(expired.len())
    }
}
