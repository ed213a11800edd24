//! Configuration for the relay and its upstream endpoint

use serde::{Deserialize, Serialize};
use log::{debug, warn};

pub const DEFAULT_API_BASE: &str
  = "https://openrouter.ai/api/v1";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";
pub const DEFAULT_APP_TITLE: &str = "AI Nihongo Kaiwa";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_APP_URL: &str = "OPENROUTER_APP_URL";
pub const ENV_API_BASE: &str = "OPENROUTER_API_BASE";
pub const ENV_MODEL: &str = "OPENROUTER_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "OPENROUTER_TIMEOUT_SECS";

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig
{   /// API base URL, without trailing slash
    pub api_base: String
  , /// Bearer key; None until one is supplied
    pub api_key: Option<String>
  , /// Sent as HTTP-Referer
    pub app_url: String
  , /// Sent as X-Title
    pub app_title: String
  , /// Model used when the caller names none
    pub default_model: String
  , /// Per-call timeout in seconds
    pub timeout_secs: u64
  , /// Ignore HTTP(S)_PROXY and friends
    #[serde(default)]
    pub no_proxy: bool
}

impl Default for RelayConfig
{   fn default() -> Self
    {   RelayConfig
        {   api_base: DEFAULT_API_BASE.to_string()
          , api_key: None
          , app_url: DEFAULT_APP_URL.to_string()
          , app_title: DEFAULT_APP_TITLE.to_string()
          , default_model: crate::FreeModel::default().id().to_string()
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , no_proxy: false
        }
    }
}

impl RelayConfig
{   /// Load from the process environment
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where F: Fn(&str) -> Option<String>
    {   let mut config = RelayConfig::default();
        let non_empty = |name: &str| {
          lookup(name).filter(|v| !v.trim().is_empty())
        };

        config.api_key = non_empty(ENV_API_KEY);
        if config.api_key.is_none()
        {   warn!(
              "{} not set; upstream calls will fail until a key is supplied",
              ENV_API_KEY
            );
        }
        if let Some(url) = non_empty(ENV_APP_URL)
        {   config.app_url = url;
        }
        if let Some(base) = non_empty(ENV_API_BASE)
        {   config.api_base = base;
        }
        if let Some(model) = non_empty(ENV_MODEL)
        {   config.default_model = model;
        }
        if let Some(raw) = non_empty(ENV_TIMEOUT_SECS)
        {   config.timeout_secs = raw.trim().parse().map_err(|e| {
              crate::error::Error::local_with(
                format!("Invalid {}: {:?}", ENV_TIMEOUT_SECS, raw)
              , format!("{}", e)
              )
            })?;
        }

        config.validate()?;
        debug!(
          "Loaded relay config: base={} model={} timeout={}s key_set={}",
          config.api_base,
          config.default_model,
          config.timeout_secs,
          config.api_key.is_some()
        );
        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self
    {   self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self
    {   self.api_base = base.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self
    {   self.timeout_secs = secs;
        self
    }

    /// Talk to the upstream directly, never through a system proxy
    pub fn with_no_proxy(mut self) -> Self
    {   self.no_proxy = true;
        self
    }

    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if self.timeout_secs == 0
        {   return Err(crate::error::Error::local(
              "Invalid configuration: timeout_secs must be positive"
            ));
        }
        if self.api_base.trim().is_empty()
        {   return Err(crate::error::Error::local(
              "Invalid configuration: api_base is empty"
            ));
        }
        if self.default_model.trim().is_empty()
        {   return Err(crate::error::Error::local(
              "Invalid configuration: default_model is empty"
            ));
        }
        Ok(())
    }

    /// Full URL for an endpoint path such as "/models"
    pub fn endpoint(&self, path: &str) -> String
    {   format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }
}
