use std::path::PathBuf;
use std::time::Duration;

use crate::actors::poller::DEFAULT_POLL_INTERVAL;

/// Polls faster than this would hammer the backend for no benefit.
const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the screenplay API; GraphQL lives at `{api_url}/graphql`
    pub api_url: String,
    /// Bearer token sent with every backend request
    pub api_token: Option<String>,
    /// Cadence of version-chain refreshes while a job is in flight
    pub poll_interval: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// JSON file holding the selected-version pointers
    pub selection_store_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
            selection_store_path: PathBuf::from("./data/selected-versions.json"),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (the process environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let poll_interval_ms = env_parse(
            &lookup,
            "SCREENPLAY_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?
        .max(MIN_POLL_INTERVAL_MS);

        Ok(Self {
            api_url: lookup("SCREENPLAY_API_URL").unwrap_or(defaults.api_url),
            api_token: lookup("SCREENPLAY_API_TOKEN").filter(|t| !t.trim().is_empty()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(env_parse(
                &lookup,
                "SCREENPLAY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            selection_store_path: lookup("SCREENPLAY_SELECTION_STORE")
                .map(PathBuf::from)
                .unwrap_or(defaults.selection_store_path),
        })
    }
}

fn env_parse<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        None => Ok(default),
    }
}

/// Load the nearest `.env`, searching the current directory and its
/// ancestors so running from a member crate still picks up the workspace one.
pub fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => tracing::info!(path = %candidate.display(), "Loaded environment from .env"),
                Err(e) => tracing::warn!(
                    path = %candidate.display(),
                    error = %e,
                    "Failed to load .env file"
                ),
            }
            return;
        }
        if !current.pop() {
            break;
        }
    }

    tracing::debug!(
        cwd = %cwd.display(),
        "No .env file found; using process environment only"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_overrides_and_interval_floor() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("SCREENPLAY_API_URL", "https://api.example.test"),
            ("SCREENPLAY_API_TOKEN", "secret"),
            ("SCREENPLAY_POLL_INTERVAL_MS", "10"),
            ("SCREENPLAY_SELECTION_STORE", "/tmp/pointers.json"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.test");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(
            config.selection_store_path,
            PathBuf::from("/tmp/pointers.json")
        );
    }

    #[test]
    fn test_parse_error_names_variable() {
        let err = EngineConfig::from_lookup(lookup_from(&[(
            "SCREENPLAY_REQUEST_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("SCREENPLAY_REQUEST_TIMEOUT_SECS=soon"));
    }
}
