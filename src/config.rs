//! Configuration loaded from the environment.
//!
//! `.env` is read first via dotenvy; real environment variables win. Secrets
//! are held as [`SecretString`] and redacted by the `Display` impl.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::auth::StaticTokenVerifier;
use crate::error::ConfigError;
use crate::rate_limit::{RateLimitConfig, TierLimits};

/// Generative provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    /// Model for single-shot tools. Falls back to `model` when unset.
    pub light_model: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            light_model: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Agent loop bounds.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Reasoning steps per turn before the turn is aborted.
    pub max_iterations: usize,
    /// Prior messages fed into a turn.
    pub history_window: usize,
    /// Characters of each tool output kept in the returned trace.
    pub trace_output_limit: usize,
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            history_window: 10,
            trace_output_limit: 2000,
            tool_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_messages: 50 }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Raw `token|subject|email|name;...` entries.
    pub tokens: Option<SecretString>,
    /// Browser origins allowed to call `/api`. Empty disables CORS.
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tokens: None,
            cors_origins: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Build the bearer-token verifier. An unset token list yields a
    /// verifier that rejects everything.
    pub fn verifier(&self) -> Result<StaticTokenVerifier, ConfigError> {
        match &self.tokens {
            Some(tokens) => StaticTokenVerifier::parse(tokens.expose_secret()),
            None => Ok(StaticTokenVerifier::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Absent means notifications are only logged.
    pub webhook_url: Option<String>,
    pub from_address: String,
    pub app_base_url: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            from_address: "no-reply@eventide.local".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub gateway: GatewayConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Config::default();

        let model = env.string("LLM_MODEL").unwrap_or(defaults.llm.model);
        let llm = LlmConfig {
            base_url: env.string("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            api_key: env.string("LLM_API_KEY").map(SecretString::from),
            light_model: env.string("LLM_LIGHT_MODEL"),
            timeout: env.secs("LLM_TIMEOUT_SECS", defaults.llm.timeout)?,
            model,
        };

        let rate_limit = RateLimitConfig {
            single: TierLimits {
                per_minute: env.parse("RATE_SINGLE_PER_MINUTE", defaults.rate_limit.single.per_minute)?,
                per_day: env.parse("RATE_SINGLE_PER_DAY", defaults.rate_limit.single.per_day)?,
            },
            agent: TierLimits {
                per_minute: env.parse("RATE_AGENT_PER_MINUTE", defaults.rate_limit.agent.per_minute)?,
                per_day: env.parse("RATE_AGENT_PER_DAY", defaults.rate_limit.agent.per_day)?,
            },
        };

        let agent = AgentConfig {
            max_iterations: env.positive("AGENT_MAX_ITERATIONS", defaults.agent.max_iterations)?,
            history_window: env.parse("AGENT_HISTORY_WINDOW", defaults.agent.history_window)?,
            trace_output_limit: env.positive(
                "AGENT_TRACE_OUTPUT_LIMIT",
                defaults.agent.trace_output_limit,
            )?,
            tool_timeout: env.secs("AGENT_TOOL_TIMEOUT_SECS", defaults.agent.tool_timeout)?,
        };

        let memory = MemoryConfig {
            max_messages: env.positive("MEMORY_MAX_MESSAGES", defaults.memory.max_messages)?,
        };

        let gateway = GatewayConfig {
            host: env.string("GATEWAY_HOST").unwrap_or(defaults.gateway.host),
            port: env.parse("GATEWAY_PORT", defaults.gateway.port)?,
            tokens: env.string("GATEWAY_TOKENS").map(SecretString::from),
            cors_origins: env.list("GATEWAY_CORS_ORIGINS"),
        };
        // Reject a malformed token list at startup, not on the first request.
        gateway.verifier()?;

        let notify = NotifyConfig {
            webhook_url: env.string("NOTIFY_WEBHOOK_URL"),
            from_address: env
                .string("NOTIFY_FROM_ADDRESS")
                .unwrap_or(defaults.notify.from_address),
            app_base_url: env.string("APP_BASE_URL").unwrap_or(defaults.notify.app_base_url),
        };

        Ok(Self {
            llm,
            rate_limit,
            agent,
            memory,
            gateway,
            notify,
        })
    }

    /// Fail unless an API key is configured.
    pub fn require_llm_key(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.is_none() {
            return Err(ConfigError::Missing("LLM_API_KEY".to_string()));
        }
        Ok(())
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Comma-separated list; blank entries dropped.
    fn list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(value)
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.parse(key, default.as_secs())?;
        if secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }
}

fn redacted(secret: &Option<SecretString>) -> &'static str {
    if secret.is_some() { "[set]" } else { "[unset]" }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "llm:")?;
        writeln!(f, "  base_url           {}", self.llm.base_url)?;
        writeln!(f, "  api_key            {}", redacted(&self.llm.api_key))?;
        writeln!(f, "  model              {}", self.llm.model)?;
        writeln!(
            f,
            "  light_model        {}",
            self.llm.light_model.as_deref().unwrap_or(&self.llm.model)
        )?;
        writeln!(f, "  timeout            {}s", self.llm.timeout.as_secs())?;
        writeln!(f, "rate_limit:")?;
        writeln!(
            f,
            "  single             {}/min, {}/day",
            self.rate_limit.single.per_minute, self.rate_limit.single.per_day
        )?;
        writeln!(
            f,
            "  agent              {}/min, {}/day",
            self.rate_limit.agent.per_minute, self.rate_limit.agent.per_day
        )?;
        writeln!(f, "agent:")?;
        writeln!(f, "  max_iterations     {}", self.agent.max_iterations)?;
        writeln!(f, "  history_window     {}", self.agent.history_window)?;
        writeln!(f, "  trace_output_limit {}", self.agent.trace_output_limit)?;
        writeln!(f, "  tool_timeout       {}s", self.agent.tool_timeout.as_secs())?;
        writeln!(f, "memory:")?;
        writeln!(f, "  max_messages       {}", self.memory.max_messages)?;
        writeln!(f, "gateway:")?;
        writeln!(f, "  listen             {}:{}", self.gateway.host, self.gateway.port)?;
        writeln!(f, "  tokens             {}", redacted(&self.gateway.tokens))?;
        if !self.gateway.cors_origins.is_empty() {
            writeln!(f, "  cors_origins       {}", self.gateway.cors_origins.join(", "))?;
        }
        writeln!(f, "notify:")?;
        writeln!(
            f,
            "  webhook_url        {}",
            self.notify.webhook_url.as_deref().unwrap_or("(log only)")
        )?;
        writeln!(f, "  from_address       {}", self.notify.from_address)?;
        write!(f, "  app_base_url       {}", self.notify.app_base_url)
    }
}
