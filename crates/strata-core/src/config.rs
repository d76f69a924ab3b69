//! Runtime configuration for Strata.
//!
//! Defaults are usable as-is. Values can be overridden from a TOML file
//! (`from_toml_str` / `from_file`) or from `STRATA_*` environment variables
//! (`from_env`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::retry::RetryPolicy;

/// Which ledger entries the promotion engine sends to long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// Maximum records per gateway call.
    pub batch_size: usize,
    /// Promote research findings as well as decisions and constraints.
    pub include_research_findings: bool,
    /// When set, only research findings with one of these scopes qualify.
    pub research_scopes: Option<Vec<String>>,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            batch_size: 100,
            include_research_findings: true,
            research_scopes: None,
        }
    }
}

/// Long-term memory service connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the memory service; `None` disables the HTTP gateway.
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Per-call timeout (milliseconds); 0 means the built-in default.
    pub timeout_ms: u64,
}

impl GatewayConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

/// Top-level Strata configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Checkpoint the working context every N turns.
    pub checkpoint_interval: u64,
    /// Bound for a single publish or revision dispatch (milliseconds).
    pub dispatch_timeout_ms: u64,
    /// How long a turn may wait for the previous turn of the same session.
    pub turn_queue_timeout_ms: u64,
    /// Prior-knowledge records pulled per namespace at session start.
    pub prior_knowledge_top_k: usize,
    pub promotion: PromotionPolicy,
    pub retry: RetryPolicy,
    pub gateway: GatewayConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 5,
            dispatch_timeout_ms: 120_000,
            turn_queue_timeout_ms: 30_000,
            prior_knowledge_top_k: 5,
            promotion: PromotionPolicy::default(),
            retry: RetryPolicy::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl StrataConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn turn_queue_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_queue_timeout_ms)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| StrataError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StrataError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `STRATA_*` environment variables.
    ///
    /// Reads:
    /// - STRATA_CHECKPOINT_INTERVAL
    /// - STRATA_DISPATCH_TIMEOUT_MS
    /// - STRATA_TURN_QUEUE_TIMEOUT_MS
    /// - STRATA_PRIOR_KNOWLEDGE_TOP_K
    /// - STRATA_PROMOTION_BATCH_SIZE
    /// - STRATA_PROMOTE_RESEARCH ("true" / "false")
    /// - STRATA_RESEARCH_SCOPES (comma separated)
    /// - STRATA_RETRY_MAX_ATTEMPTS
    /// - STRATA_MEMORY_URL, STRATA_MEMORY_API_KEY, STRATA_MEMORY_TIMEOUT_MS
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse(&lookup, "STRATA_CHECKPOINT_INTERVAL")? {
            config.checkpoint_interval = v;
        }
        if let Some(v) = parse(&lookup, "STRATA_DISPATCH_TIMEOUT_MS")? {
            config.dispatch_timeout_ms = v;
        }
        if let Some(v) = parse(&lookup, "STRATA_TURN_QUEUE_TIMEOUT_MS")? {
            config.turn_queue_timeout_ms = v;
        }
        if let Some(v) = parse(&lookup, "STRATA_PRIOR_KNOWLEDGE_TOP_K")? {
            config.prior_knowledge_top_k = v;
        }
        if let Some(v) = parse(&lookup, "STRATA_PROMOTION_BATCH_SIZE")? {
            config.promotion.batch_size = v;
        }
        if let Some(v) = parse(&lookup, "STRATA_PROMOTE_RESEARCH")? {
            config.promotion.include_research_findings = v;
        }
        if let Some(scopes) = lookup("STRATA_RESEARCH_SCOPES") {
            let scopes: Vec<String> = scopes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            config.promotion.research_scopes = Some(scopes);
        }
        if let Some(v) = parse(&lookup, "STRATA_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        config.gateway.url = lookup("STRATA_MEMORY_URL").or(config.gateway.url);
        config.gateway.api_key = lookup("STRATA_MEMORY_API_KEY").or(config.gateway.api_key);
        if let Some(v) = parse(&lookup, "STRATA_MEMORY_TIMEOUT_MS")? {
            config.gateway.timeout_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or disable the core loops.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(StrataError::Config(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.promotion.batch_size == 0 {
            return Err(StrataError::Config(
                "promotion.batch_size must be at least 1".to_string(),
            ));
        }
        if self.dispatch_timeout_ms == 0 || self.turn_queue_timeout_ms == 0 {
            return Err(StrataError::Config("timeouts must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(StrataError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| StrataError::Config(format!("{key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = StrataConfig::default();
        config.validate().unwrap();
        assert_eq!(config.checkpoint_interval, 5);
        assert_eq!(config.promotion.batch_size, 100);
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STRATA_CHECKPOINT_INTERVAL", "3"),
            ("STRATA_PROMOTION_BATCH_SIZE", "25"),
            ("STRATA_PROMOTE_RESEARCH", "false"),
            ("STRATA_RESEARCH_SCOPES", "market, pricing"),
            ("STRATA_MEMORY_URL", "http://memory.local"),
        ]
        .into_iter()
        .collect();

        let config =
            StrataConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.checkpoint_interval, 3);
        assert_eq!(config.promotion.batch_size, 25);
        assert!(!config.promotion.include_research_findings);
        assert_eq!(
            config.promotion.research_scopes,
            Some(vec!["market".to_string(), "pricing".to_string()])
        );
        assert_eq!(config.gateway.url.as_deref(), Some("http://memory.local"));
    }

    #[test]
    fn env_parse_error_names_the_key() {
        let err = StrataConfig::from_lookup(|k| {
            (k == "STRATA_CHECKPOINT_INTERVAL").then(|| "often".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("STRATA_CHECKPOINT_INTERVAL"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = StrataConfig::from_toml_str("[promotion]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[test]
    fn toml_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "checkpoint_interval = 10\n\n[gateway]\nurl = \"http://mem\"\ntimeout_ms = 250\n"
        )
        .unwrap();

        let config = StrataConfig::from_file(file.path()).unwrap();
        assert_eq!(config.checkpoint_interval, 10);
        assert_eq!(config.gateway.timeout(), Duration::from_millis(250));
        // Untouched sections keep defaults.
        assert_eq!(config.promotion.batch_size, 100);
    }
}
