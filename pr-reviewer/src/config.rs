//! Environment configuration.
//!
//! | variable                            | default                  |
//! |-------------------------------------|--------------------------|
//! | `GITHUB_TOKEN` / `GH_TOKEN`         | required for API calls   |
//! | `GITHUB_API_URL`                    | `https://api.github.com` |
//! | `GITHUB_REPOSITORY`                 | none (`owner/repo`)      |
//! | `PR_REVIEWER_DRY_RUN`               | `false`                  |
//! | `PR_REVIEWER_FALLBACK`              | `true`                   |
//! | `PR_REVIEWER_MAX_RETRIES`           | `3`                      |
//! | `PR_REVIEWER_RETRY_BASE_MS`         | `250`                    |
//! | `PR_REVIEWER_HTTP_TIMEOUT_SECS`     | `30`                     |
//! | `PR_REVIEWER_ANALYSIS_TIMEOUT_SECS` | `120`                    |
//! | `PR_REVIEWER_CACHE_DIR`             | unset (cache disabled)   |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::git_providers::{DEFAULT_GITHUB_API, ProviderConfig, RetryPolicy};
use crate::publish::PublishConfig;

#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    pub token: Option<String>,
    pub base_api: String,
    /// Default `owner/repo` when the caller does not name one.
    pub repository: Option<String>,
    pub publish: PublishConfig,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    /// Per-pass budget of the analysis fan-out.
    pub analysis_timeout: Duration,
    pub cache_dir: Option<PathBuf>,
}

impl ReviewerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = non_empty("GITHUB_TOKEN").or_else(|| non_empty("GH_TOKEN"));
        let base_api =
            non_empty("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
        let repository = non_empty("GITHUB_REPOSITORY");

        let publish = PublishConfig {
            dry_run: parse_bool("PR_REVIEWER_DRY_RUN", non_empty("PR_REVIEWER_DRY_RUN"), false)?,
            allow_fallback: parse_bool(
                "PR_REVIEWER_FALLBACK",
                non_empty("PR_REVIEWER_FALLBACK"),
                true,
            )?,
        };
        let retry = RetryPolicy::new(
            parse_num("PR_REVIEWER_MAX_RETRIES", non_empty("PR_REVIEWER_MAX_RETRIES"), 3)?,
            Duration::from_millis(parse_num(
                "PR_REVIEWER_RETRY_BASE_MS",
                non_empty("PR_REVIEWER_RETRY_BASE_MS"),
                250,
            )?),
        );
        let http_timeout = Duration::from_secs(parse_num(
            "PR_REVIEWER_HTTP_TIMEOUT_SECS",
            non_empty("PR_REVIEWER_HTTP_TIMEOUT_SECS"),
            30,
        )?);
        let analysis_timeout = Duration::from_secs(parse_num(
            "PR_REVIEWER_ANALYSIS_TIMEOUT_SECS",
            non_empty("PR_REVIEWER_ANALYSIS_TIMEOUT_SECS"),
            120,
        )?);
        let cache_dir = non_empty("PR_REVIEWER_CACHE_DIR").map(PathBuf::from);

        Ok(Self {
            token,
            base_api,
            repository,
            publish,
            retry,
            http_timeout,
            analysis_timeout,
            cache_dir,
        })
    }

    /// Client configuration; fails without a token.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let token = self.token.clone().ok_or(ConfigError::MissingToken)?;
        Ok(ProviderConfig {
            base_api: self.base_api.clone(),
            token,
            timeout: self.http_timeout,
            retry: self.retry,
        })
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(v) = value else {
        return Ok(default);
    };
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
    }
}

fn parse_num<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Result<ReviewerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReviewerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.base_api, DEFAULT_GITHUB_API);
        assert!(c.token.is_none());
        assert!(!c.publish.dry_run);
        assert!(c.publish.allow_fallback);
        assert_eq!(c.retry.max_retries, 3);
        assert_eq!(c.retry.base_delay, Duration::from_millis(250));
        assert_eq!(c.http_timeout, Duration::from_secs(30));
        assert_eq!(c.analysis_timeout, Duration::from_secs(120));
        assert!(c.cache_dir.is_none());
        assert!(matches!(c.provider_config(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn overrides_and_token_fallback() {
        let c = cfg(&[
            ("GH_TOKEN", "ghp_x"),
            ("GITHUB_API_URL", "https://ghe.local/api/v3"),
            ("PR_REVIEWER_DRY_RUN", "yes"),
            ("PR_REVIEWER_FALLBACK", "off"),
            ("PR_REVIEWER_MAX_RETRIES", "0"),
            ("PR_REVIEWER_CACHE_DIR", "/tmp/prc"),
        ])
        .unwrap();
        assert!(c.publish.dry_run);
        assert!(!c.publish.allow_fallback);
        assert_eq!(c.retry.max_retries, 0);
        assert_eq!(c.cache_dir, Some(PathBuf::from("/tmp/prc")));
        let p = c.provider_config().unwrap();
        assert_eq!(p.token, "ghp_x");
        assert_eq!(p.base_api, "https://ghe.local/api/v3");
    }

    #[test]
    fn github_token_wins_and_blank_is_unset() {
        let c = cfg(&[("GITHUB_TOKEN", "a"), ("GH_TOKEN", "b")]).unwrap();
        assert_eq!(c.token.as_deref(), Some("a"));
        let c = cfg(&[("GITHUB_TOKEN", "  "), ("GH_TOKEN", "b")]).unwrap();
        assert_eq!(c.token.as_deref(), Some("b"));
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            cfg(&[("PR_REVIEWER_MAX_RETRIES", "many")]),
            Err(ConfigError::InvalidValue { key, .. }) if key == "PR_REVIEWER_MAX_RETRIES"
        ));
        assert!(cfg(&[("PR_REVIEWER_DRY_RUN", "maybe")]).is_err());
    }
}
