use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::debug;

use super::{PolicyRequest, PolicySubject};

/// A named verification policy.
///
/// `verify` returns a policy-specific detail on success; an error is recorded as a failed
/// outcome for this policy only.
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    async fn verify(&self, subject: PolicySubject<'_>, args: Option<&Json>) -> Result<Json>;
}

/// Executes named policies against presentations and credentials.
#[async_trait]
pub trait PolicyExecutor: Send + Sync {
    /// Whether a policy with this name can be executed.
    fn is_registered(&self, name: &str) -> bool;

    /// Every known policy, by name, with its description.
    fn list_policy_descriptions(&self) -> BTreeMap<String, Option<String>>;

    async fn execute(&self, request: &PolicyRequest, subject: PolicySubject<'_>) -> Result<Json>;
}

/// Registry of [Policy] implementations.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct PolicyManager {
    policies: BTreeMap<String, Arc<dyn Policy>>,
}

impl PolicyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under its own name.
    pub fn register(&mut self, policy: Arc<dyn Policy>) -> Result<()> {
        let name = policy.name().to_owned();
        if self.policies.contains_key(&name) {
            bail!("policy `{name}` is already registered")
        }
        self.policies.insert(name, policy);
        Ok(())
    }

    /// Builder-style [PolicyManager::register].
    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Result<Self> {
        self.register(policy)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Policy>> {
        self.policies.get(name)
    }
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl PolicyExecutor for PolicyManager {
    fn is_registered(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    fn list_policy_descriptions(&self) -> BTreeMap<String, Option<String>> {
        self.policies
            .iter()
            .map(|(name, policy)| (name.clone(), policy.description().map(ToOwned::to_owned)))
            .collect()
    }

    async fn execute(&self, request: &PolicyRequest, subject: PolicySubject<'_>) -> Result<Json> {
        let Some(policy) = self.policies.get(&request.policy) else {
            bail!("unknown policy `{}`", request.policy)
        };

        debug!(policy = %request.policy, "executing policy");
        policy.verify(subject, request.args.as_ref()).await
    }
}
