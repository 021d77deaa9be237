//! Verifier side of [OpenID for Verifiable Presentations], with Presentation Exchange
//! presentation definitions and pluggable verification policies.
//!
//! [OpenID for Verifiable Presentations]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Usage
//!
//! Register the policies your deployment supports, then build a [`Verifier`]:
//!
//! ```ignore
//! use std::sync::Arc;
//! use openid4vp_verifier::config::Config;
//! use openid4vp_verifier::policy::PolicyManager;
//! use openid4vp_verifier::verifier::{session::MemoryStore, request::SessionOptions, Verifier};
//!
//! let config = Config::load(Some("verifier.json".as_ref()))?;
//!
//! let policies = PolicyManager::new()
//!     .with_policy(Arc::new(MySignaturePolicy))?
//!     .with_policy(Arc::new(MyExpiryPolicy))?;
//!
//! let verifier = Verifier::builder()
//!     .with_session_store(Arc::new(MemoryStore::new()))
//!     .with_policy_executor(Arc::new(policies))
//!     .with_config(config.verifier_service)
//!     .build()?;
//!
//! // Create a session requesting a `VerifiableId`, checked with the default signature policy.
//! let request = verifier.parse_request(&serde_json::json!({
//!     "request_credentials": ["VerifiableId"]
//! }))?;
//! let session = verifier
//!     .initialize_session(request, SessionOptions::default())
//!     .await?;
//!
//! // Render `session.authorization_url` as a QR code. The wallet posts its answer to
//! // `{base_url}openid4vc/verify/{id}`:
//! let decision = verifier.submit(&session.session.id, &form_body).await?;
//! ```
//!
//! The [`api::VerifierApi`] wraps these operations as HTTP request/response pairs.
//!
//! # Protocol Overview
//!
//! 1. A session is created from a request naming the credentials and the policies to check
//!    ([`verifier::request::VerificationRequest`]). A presentation definition is synthesized
//!    from the credential types unless one is given.
//! 2. The [`AuthorizationRequestObject`] is encoded as query parameters of the wallet's
//!    authorization URL, with `state` set to the session id.
//! 3. The wallet answers with a `vp_token` and a `presentation_submission` whose descriptor
//!    map locates each credential ([`core::presentation_submission`]).
//! 4. Presentation policies run against the presentation, credential policies against every
//!    credential, all concurrently. The session passes iff every policy passes.
//!
//! [`Verifier`]: crate::verifier::Verifier
//! [`AuthorizationRequestObject`]: crate::core::authorization_request::AuthorizationRequestObject

pub mod api;
pub mod config;
pub mod core;
pub mod policy;
pub mod utils;
pub mod verifier;
pub use serde_json_path::JsonPath;
