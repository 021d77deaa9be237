use std::{path::Path, time::Duration};

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::core::authorization_request::DEFAULT_AUTHORIZE_BASE_URL;

/// Prefix of environment variables overriding the configuration, e.g.
/// `VERIFIER_VERIFIER_SERVICE__BASE_URL`.
pub const ENV_PREFIX: &str = "VERIFIER_";

const DEFAULT_BASE_URL: &str = "http://localhost:7003/";

/// Longest accepted session lifetime: 30 days.
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest accepted policy fan-out: one hour.
pub const MAX_VERIFICATION_TIMEOUT_SECS: u64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration value for `{key}`: {reason}")]
    Value { key: &'static str, reason: String },
}

/// Source of configuration sections.
pub trait ConfigProvider {
    /// Deserialize the section stored under `key`.
    fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError>;
}

impl ConfigProvider for Figment {
    fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.extract_inner(key).map_err(|e| Box::new(e).into())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub web: WebConfig,
    pub verifier_service: VerifierServiceConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 7003,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VerifierServiceConfig {
    /// Public URL of this service, used to build `response_uri` and
    /// `presentation_definition_uri`.
    pub base_url: BaseUrl,
    /// Wallet endpoint used when a session-init request does not name one.
    pub authorize_base_url: String,
    pub session_ttl_secs: u64,
    /// Upper bound on the policy fan-out of a single submission.
    pub verification_timeout_secs: u64,
    /// Pass the presentation definition by reference (`presentation_definition_uri`)
    /// instead of inlining it in the authorization request.
    pub presentation_definition_by_reference: bool,
}

impl Default for VerifierServiceConfig {
    fn default() -> Self {
        Self {
            base_url: BaseUrl::default(),
            authorize_base_url: DEFAULT_AUTHORIZE_BASE_URL.into(),
            session_ttl_secs: 300,
            verification_timeout_secs: 30,
            presentation_definition_by_reference: false,
        }
    }
}

impl VerifierServiceConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    /// Where wallets post their response for session `id`.
    pub fn response_uri(&self, id: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("openid4vc/verify/{id}"))
    }

    /// Where wallets fetch the presentation definition of session `id`.
    pub fn presentation_definition_uri(&self, id: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("openid4vc/pd/{id}"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authorize_base_url.is_empty() {
            return Err(ConfigError::Value {
                key: "verifier_service.authorize_base_url",
                reason: "must not be empty".into(),
            });
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Value {
                key: "verifier_service.session_ttl_secs",
                reason: format!("must be at most {MAX_SESSION_TTL_SECS} seconds"),
            });
        }
        if !(1..=MAX_VERIFICATION_TIMEOUT_SECS).contains(&self.verification_timeout_secs) {
            return Err(ConfigError::Value {
                key: "verifier_service.verification_timeout_secs",
                reason: format!("must be between 1 and {MAX_VERIFICATION_TIMEOUT_SECS} seconds"),
            });
        }
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Value {
                key: "verifier_service.base_url",
                reason: "must be a hierarchical URL".into(),
            });
        }
        Ok(())
    }
}

impl Config {
    /// Layered configuration: defaults, then the JSON file at `path` (if any), then
    /// [ENV_PREFIX]ed environment variables with `__` separating sections.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_provider(&Self::figment(path))
    }

    pub fn from_provider(provider: &impl ConfigProvider) -> Result<Self, ConfigError> {
        let config = Self {
            web: provider.section("web")?,
            verifier_service: provider.section("verifier_service")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.verifier_service.validate()
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Serialize, Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl Default for BaseUrl {
    fn default() -> Self {
        Self(
            DEFAULT_BASE_URL
                .parse()
                .expect("DEFAULT_BASE_URL is an absolute URL"),
        )
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.0.into()
    }
}
