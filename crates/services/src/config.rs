use std::env;
use std::time::Duration;

use crate::submission::SubmissionPolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_STORE_URL: &str = "sqlite:exam-session.sqlite3";

/// Endpoints and limits for the exam client, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub store_url: String,
    pub submit_timeout: Duration,
    pub submit_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = SubmissionPolicy::default();
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            store_url: DEFAULT_STORE_URL.into(),
            submit_timeout: policy.attempt_timeout,
            submit_attempts: policy.max_attempts,
            retry_delay: policy.retry_delay,
        }
    }
}

impl ClientConfig {
    /// Read `EXAM_API_BASE_URL`, `EXAM_STORE_URL`, `EXAM_SUBMIT_TIMEOUT_SECS`
    /// and `EXAM_SUBMIT_ATTEMPTS`. Missing or unparsable values keep defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = non_empty("EXAM_API_BASE_URL") {
            config.base_url = base_url.trim().trim_end_matches('/').to_owned();
        }
        if let Some(store_url) = non_empty("EXAM_STORE_URL") {
            config.store_url = store_url.trim().to_owned();
        }
        if let Some(secs) = non_empty("EXAM_SUBMIT_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok())
        {
            config.submit_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = non_empty("EXAM_SUBMIT_ATTEMPTS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            config.submit_attempts = attempts;
        }
        config
    }

    #[must_use]
    pub fn submission_policy(&self) -> SubmissionPolicy {
        SubmissionPolicy {
            attempt_timeout: self.submit_timeout,
            max_attempts: self.submit_attempts,
            retry_delay: self.retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.submit_attempts, 2);
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("EXAM_API_BASE_URL", "https://api.example/ "),
            ("EXAM_SUBMIT_TIMEOUT_SECS", "3"),
            ("EXAM_SUBMIT_ATTEMPTS", "0"),
        ]));
        assert_eq!(config.base_url, "https://api.example");
        assert_eq!(config.submit_timeout, Duration::from_secs(3));
        assert_eq!(config.submit_attempts, 2);
    }
}
