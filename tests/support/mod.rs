use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::prelude::*;
use openid4vp_verifier::{
    api::VerifierApi,
    config::VerifierServiceConfig,
    policy::{Policy, PolicyManager, PolicySubject},
    verifier::{
        session::{
            MemoryStore, PresentationSession, PresentationSessionResult, SessionStore,
            SessionVerificationInfo,
        },
        Verifier,
    },
};
use serde_json::{json, Value as Json};
use tokio::sync::Barrier;

/// Passes, returning its arguments.
pub struct Accept(pub &'static str);

#[async_trait]
impl Policy for Accept {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> Option<&str> {
        Some("Always succeeds")
    }

    async fn verify(&self, _: PolicySubject<'_>, args: Option<&Json>) -> Result<Json> {
        Ok(args.cloned().unwrap_or(Json::Null))
    }
}

/// Fails for every subject.
pub struct Reject(pub &'static str);

#[async_trait]
impl Policy for Reject {
    fn name(&self) -> &str {
        self.0
    }

    async fn verify(&self, _: PolicySubject<'_>, _: Option<&Json>) -> Result<Json> {
        bail!("{} check failed", self.0)
    }
}

/// Never completes.
pub struct Hang;

#[async_trait]
impl Policy for Hang {
    fn name(&self) -> &str {
        "hang"
    }

    async fn verify(&self, _: PolicySubject<'_>, _: Option<&Json>) -> Result<Json> {
        std::future::pending().await
    }
}

/// Panics on every invocation.
pub struct Panics(pub &'static str);

#[async_trait]
impl Policy for Panics {
    fn name(&self) -> &str {
        self.0
    }

    async fn verify(&self, _: PolicySubject<'_>, _: Option<&Json>) -> Result<Json> {
        let statuses: Vec<Json> = Vec::new();
        Ok(statuses[0].clone())
    }
}

/// Records the highest number of concurrent invocations.
#[derive(Default)]
pub struct Concurrency {
    running: AtomicUsize,
    pub max: AtomicUsize,
}

#[async_trait]
impl Policy for Concurrency {
    fn name(&self) -> &str {
        "concurrency"
    }

    async fn verify(&self, _: PolicySubject<'_>, _: Option<&Json>) -> Result<Json> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Json::Null)
    }
}

/// Completes only once two invocations wait on it at the same time.
pub struct Rendezvous(pub Barrier);

#[async_trait]
impl Policy for Rendezvous {
    fn name(&self) -> &str {
        "rendezvous"
    }

    async fn verify(&self, _: PolicySubject<'_>, _: Option<&Json>) -> Result<Json> {
        self.0.wait().await;
        Ok(Json::Null)
    }
}

pub fn policies() -> PolicyManager {
    PolicyManager::new()
        .with_policy(Arc::new(Accept("signature")))
        .and_then(|m| m.with_policy(Arc::new(Accept("webhook"))))
        .and_then(|m| m.with_policy(Arc::new(Reject("expired"))))
        .and_then(|m| m.with_policy(Arc::new(Hang)))
        .unwrap()
}

pub fn verifier_with(
    policies: PolicyManager,
    store: Arc<dyn SessionStore>,
    config: VerifierServiceConfig,
) -> Verifier {
    Verifier::builder()
        .with_session_store(store)
        .with_policy_executor(Arc::new(policies))
        .with_config(config)
        .build()
        .unwrap()
}

pub fn api() -> VerifierApi {
    VerifierApi::new(verifier_with(
        policies(),
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig::default(),
    ))
}

pub fn unsigned_jwt(claims: Json) -> String {
    format!(
        "{}.{}.",
        BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#),
        BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Form-encoded wallet response presenting one JWT credential per type, each answering the
/// input descriptor of the same name.
pub fn wallet_response(state: &str, definition_id: &str, credential_types: &[&str]) -> Vec<u8> {
    let credentials: Vec<String> = credential_types
        .iter()
        .map(|credential_type| {
            unsigned_jwt(json!({
                "iss": "did:key:z6MkjoRhq1jSNJdLiruSXrFFxagqrztZaXHqHGUTKJbcNywp",
                "sub": "did:key:z6MkqmaCT2JqdUtLeKah7tEVfNXtDXtQyj4yxEgV11Y5CqUa",
                "vc": {
                    "@context": ["https://www.w3.org/2018/credentials/v1"],
                    "type": ["VerifiableCredential", credential_type],
                    "credentialSubject": { "id": "did:key:z6MkqmaCT2JqdUtLeKah7tEVfNXtDXtQyj4yxEgV11Y5CqUa" }
                }
            }))
        })
        .collect();

    let vp_token = unsigned_jwt(json!({
        "iss": "did:key:z6MkqmaCT2JqdUtLeKah7tEVfNXtDXtQyj4yxEgV11Y5CqUa",
        "vp": {
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiablePresentation"],
            "verifiableCredential": credentials
        }
    }));

    let descriptor_map: Vec<Json> = credential_types
        .iter()
        .enumerate()
        .map(|(i, credential_type)| {
            json!({
                "id": credential_type,
                "format": "jwt_vp",
                "path": "$",
                "path_nested": {
                    "id": credential_type,
                    "format": "jwt_vc_json",
                    "path": format!("$.verifiableCredential[{i}]")
                }
            })
        })
        .collect();

    let submission = json!({
        "id": "b6a6fc33-2d3d-4c0a-8e4f-7e3b7e1c2f9a",
        "definition_id": definition_id,
        "descriptor_map": descriptor_map
    });

    serde_urlencoded::to_string(vec![
        ("vp_token", vp_token),
        ("presentation_submission", submission.to_string()),
        ("state", state.to_owned()),
    ])
    .unwrap()
    .into_bytes()
}

/// A store that loses verification info, which must never happen in practice.
#[derive(Debug, Default)]
pub struct ForgetfulStore(pub MemoryStore);

#[async_trait]
impl SessionStore for ForgetfulStore {
    async fn initiate(
        &self,
        session: PresentationSession,
        info: SessionVerificationInfo,
    ) -> Result<()> {
        self.0.initiate(session, info).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<PresentationSession>> {
        self.0.get_session(id).await
    }

    async fn get_verification_info(&self, _: &str) -> Result<Option<SessionVerificationInfo>> {
        Ok(None)
    }

    async fn store_result(
        &self,
        id: &str,
        result: PresentationSessionResult,
    ) -> Result<Option<PresentationSessionResult>> {
        self.0.store_result(id, result).await
    }

    async fn get_result(&self, id: &str) -> Result<Option<PresentationSessionResult>> {
        self.0.get_result(id).await
    }

    async fn remove_session(&self, id: &str) -> Result<bool> {
        self.0.remove_session(id).await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.0.purge_expired().await
    }
}

/// A store whose sessions end while their submission is being verified.
#[derive(Debug, Default)]
pub struct VanishingStore(pub MemoryStore);

#[async_trait]
impl SessionStore for VanishingStore {
    async fn initiate(
        &self,
        session: PresentationSession,
        info: SessionVerificationInfo,
    ) -> Result<()> {
        self.0.initiate(session, info).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<PresentationSession>> {
        self.0.get_session(id).await
    }

    async fn get_verification_info(&self, id: &str) -> Result<Option<SessionVerificationInfo>> {
        self.0.get_verification_info(id).await
    }

    async fn store_result(
        &self,
        id: &str,
        result: PresentationSessionResult,
    ) -> Result<Option<PresentationSessionResult>> {
        self.0.remove_session(id).await?;
        self.0.store_result(id, result).await
    }

    async fn get_result(&self, id: &str) -> Result<Option<PresentationSessionResult>> {
        self.0.get_result(id).await
    }

    async fn remove_session(&self, id: &str) -> Result<bool> {
        self.0.remove_session(id).await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.0.purge_expired().await
    }
}

/// Query parameters of an authorization URL.
pub fn query_parameters(authorization_url: &str) -> BTreeMap<String, String> {
    url::Url::parse(authorization_url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
