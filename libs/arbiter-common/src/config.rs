// Process configuration shared by the API and the worker.
// Every value comes from the environment and has a development default.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub execution_service_url: String,
    pub execution_auth_token: Option<String>,
    pub execution_timeout: Duration,
    pub worker_concurrency: usize,
    pub languages_path: PathBuf,
    pub api_addr: String,
    pub storage_dir: PathBuf,
    pub storage_public_url: String,
    pub storage_signing_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timeout_secs = lookup("EXECUTION_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        let worker_concurrency = lookup("WORKER_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(4);

        Self {
            redis_url: get("REDIS_URL", "redis://127.0.0.1:6379"),
            execution_service_url: get("EXECUTION_SERVICE_URL", "http://127.0.0.1:2358"),
            execution_auth_token: lookup("EXECUTION_AUTH_TOKEN").filter(|t| !t.is_empty()),
            execution_timeout: Duration::from_secs(timeout_secs),
            worker_concurrency,
            languages_path: PathBuf::from(get("LANGUAGES_CONFIG", "config/languages.json")),
            api_addr: get("API_ADDR", "0.0.0.0:3000"),
            storage_dir: PathBuf::from(get("STORAGE_DIR", "data/assets")),
            storage_public_url: get("STORAGE_PUBLIC_URL", "http://localhost:3000/files"),
            storage_signing_key: get("STORAGE_SIGNING_KEY", "dev-signing-key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.worker_concurrency, 4);
        assert!(config.execution_auth_token.is_none());
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EXECUTION_SERVICE_URL", "https://judge.internal"),
            ("EXECUTION_TIMEOUT_SECS", "not-a-number"),
            ("WORKER_CONCURRENCY", "0"),
            ("EXECUTION_AUTH_TOKEN", "secret"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.execution_service_url, "https://judge.internal");
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.execution_auth_token.as_deref(), Some("secret"));
    }
}
