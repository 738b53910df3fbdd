use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub opensearch: OpenSearchConfig,
    pub indexing: IndexingConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["OPENSEARCH_HOST", "OPENSEARCH_USERNAME", "RULES_INDEX"];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DETECT_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DETECT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            opensearch: OpenSearchConfig::from_env_profiled(p),
            indexing: IndexingConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  opensearch:  url={}, auth={}", self.opensearch.base_url(), self.opensearch.username.is_some());
        tracing::info!(
            "  indexing:    rules_index={}, mappings_index={}, schema={}, timeout={}s",
            self.indexing.rules_index,
            self.indexing.field_mappings_index,
            self.indexing.default_schema,
            self.indexing.write_timeout_secs
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "opensearch": {
                "host": self.opensearch.host,
                "port": self.opensearch.port,
                "use_ssl": self.opensearch.use_ssl,
                "configured": self.opensearch.is_configured(),
            },
            "indexing": {
                "rules_index": self.indexing.rules_index,
                "field_mappings_index": self.indexing.field_mappings_index,
                "default_schema": self.indexing.default_schema,
                "write_timeout_secs": self.indexing.write_timeout_secs,
            },
        })
    }
}

// ── OpenSearch ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
}

impl OpenSearchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "OPENSEARCH_HOST", "localhost"),
            port: profiled_env_u16(p, "OPENSEARCH_PORT", 9200),
            username: profiled_env_opt(p, "OPENSEARCH_USERNAME"),
            password: profiled_env_opt(p, "OPENSEARCH_PASSWORD"),
            use_ssl: profiled_env_or(p, "OPENSEARCH_USE_SSL", "false") == "true",
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn is_configured(&self) -> bool {
        self.host != "localhost" || self.username.is_some()
    }
}

// ── Rule indexing ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Index holding compiled rule documents.
    pub rules_index: String,
    /// Index holding raw-field → schema-field mapping documents.
    pub field_mappings_index: String,
    /// Schema identifier resolved mappings are stored under.
    pub default_schema: String,
    /// Upper bound on the primary rule write.
    pub write_timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            rules_index: ".detect-prepackaged-rules".to_string(),
            field_mappings_index: ".detect-field-mappings".to_string(),
            default_schema: "ecs".to_string(),
            write_timeout_secs: 10,
        }
    }
}

impl IndexingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            rules_index: profiled_env_or(p, "RULES_INDEX", &defaults.rules_index),
            field_mappings_index: profiled_env_or(p, "FIELD_MAPPINGS_INDEX", &defaults.field_mappings_index),
            default_schema: profiled_env_or(p, "DEFAULT_SCHEMA", &defaults.default_schema),
            write_timeout_secs: profiled_env_u64(p, "RULE_WRITE_TIMEOUT_SECS", defaults.write_timeout_secs),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
