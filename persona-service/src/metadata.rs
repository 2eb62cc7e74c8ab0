//! HTTP metadata provider.
//!
//! Looks up age, gender and nationality for a first name from three
//! agify/genderize/nationalize style endpoints (`GET <url>?name=<name>`).
//! All three share one client and one rate limiter.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use persona_core::{ConfigError, MetadataError, MetadataProvider, PersonaResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_AGIFY_URL, DEFAULT_GENDERIZE_URL, DEFAULT_METADATA_BURST,
    DEFAULT_METADATA_MAX_IDLE_CONNECTIONS, DEFAULT_METADATA_RATE_LIMIT,
    DEFAULT_METADATA_TIMEOUT_SECS, DEFAULT_NATIONALIZE_URL,
};

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

const AGIFY: &str = "agify";
const GENDERIZE: &str = "genderize";
const NATIONALIZE: &str = "nationalize";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub agify_url: String,
    pub genderize_url: String,
    pub nationalize_url: String,
    /// Deadline for one lookup request
    pub timeout: Duration,
    /// Requests per minute across all three endpoints
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            agify_url: DEFAULT_AGIFY_URL.to_string(),
            genderize_url: DEFAULT_GENDERIZE_URL.to_string(),
            nationalize_url: DEFAULT_NATIONALIZE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
            rate_limit_per_minute: DEFAULT_METADATA_RATE_LIMIT,
            rate_limit_burst: DEFAULT_METADATA_BURST,
        }
    }
}

impl MetadataConfig {
    /// Environment variables:
    /// - `PERSONA_AGIFY_URL`, `PERSONA_GENDERIZE_URL`, `PERSONA_NATIONALIZE_URL`
    /// - `PERSONA_METADATA_TIMEOUT_SECS` (default: 5)
    /// - `PERSONA_METADATA_RATE_LIMIT`: requests per minute (default: 600)
    /// - `PERSONA_METADATA_BURST` (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agify_url: std::env::var("PERSONA_AGIFY_URL").unwrap_or(defaults.agify_url),
            genderize_url: std::env::var("PERSONA_GENDERIZE_URL")
                .unwrap_or(defaults.genderize_url),
            nationalize_url: std::env::var("PERSONA_NATIONALIZE_URL")
                .unwrap_or(defaults.nationalize_url),
            timeout: std::env::var("PERSONA_METADATA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            rate_limit_per_minute: std::env::var("PERSONA_METADATA_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_per_minute),
            rate_limit_burst: std::env::var("PERSONA_METADATA_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_burst),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("PERSONA_AGIFY_URL", &self.agify_url),
            ("PERSONA_GENDERIZE_URL", &self.genderize_url),
            ("PERSONA_NATIONALIZE_URL", &self.nationalize_url),
        ] {
            if url.is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct AgeResponse {
    #[serde(default)]
    age: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct GenderResponse {
    #[serde(default)]
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountryGuess {
    country_id: String,
    #[serde(default)]
    probability: f64,
}

#[derive(Debug, Default, Deserialize)]
struct NationResponse {
    #[serde(default)]
    country: Vec<CountryGuess>,
}

fn age_from(res: AgeResponse) -> Result<i32, MetadataError> {
    match res.age {
        Some(age) if age > 0 => Ok(age),
        _ => Err(MetadataError::MissingField { field: "age" }),
    }
}

fn gender_from(res: GenderResponse) -> Result<String, MetadataError> {
    match res.gender {
        Some(gender) if !gender.is_empty() => Ok(gender),
        _ => Err(MetadataError::MissingField { field: "gender" }),
    }
}

/// Most probable country. Ties keep the first listed.
fn nation_from(res: NationResponse) -> Result<String, MetadataError> {
    res.country
        .into_iter()
        .filter(|c| !c.country_id.is_empty())
        .fold(None::<CountryGuess>, |best, c| match best {
            Some(b) if b.probability >= c.probability => Some(b),
            _ => Some(c),
        })
        .map(|c| c.country_id)
        .ok_or(MetadataError::MissingField { field: "nation" })
}

// ============================================================================
// PROVIDER
// ============================================================================

/// [`MetadataProvider`] over HTTP.
pub struct HttpMetadataProvider {
    client: reqwest::Client,
    config: MetadataConfig,
    limiter: Arc<DirectRateLimiter>,
}

impl HttpMetadataProvider {
    pub fn new(config: MetadataConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(DEFAULT_METADATA_MAX_IDLE_CONNECTIONS)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "metadata http client".to_string(),
                value: String::new(),
                reason: e.to_string(),
            })?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.rate_limit_burst).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            config,
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        url: &str,
        name: &str,
    ) -> Result<T, MetadataError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(&[("name", name)])
            .send()
            .await
            .map_err(|e| request_failed(provider, e))?;
        let response = response
            .error_for_status()
            .map_err(|e| request_failed(provider, e))?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| request_failed(provider, e))?;

        tracing::debug!(provider, name, "Metadata lookup complete");
        Ok(body)
    }
}

fn request_failed(provider: &'static str, err: reqwest::Error) -> MetadataError {
    if err.is_timeout() {
        return MetadataError::Timeout { provider };
    }
    MetadataError::RequestFailed {
        provider,
        reason: err.to_string(),
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    async fn age_by_name(&self, name: &str) -> PersonaResult<i32> {
        let res = self.lookup(AGIFY, &self.config.agify_url, name).await?;
        Ok(age_from(res)?)
    }

    async fn gender_by_name(&self, name: &str) -> PersonaResult<String> {
        let res = self
            .lookup(GENDERIZE, &self.config.genderize_url, name)
            .await?;
        Ok(gender_from(res)?)
    }

    async fn nation_by_name(&self, name: &str) -> PersonaResult<String> {
        let res = self
            .lookup(NATIONALIZE, &self.config.nationalize_url, name)
            .await?;
        Ok(nation_from(res)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: DeserializeOwned>(body: &str) -> T {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_age_requires_positive_value() {
        assert_eq!(age_from(parse(r#"{"name":"ivan","age":42}"#)), Ok(42));
        for body in [r#"{"age":0}"#, r#"{"age":null}"#, r#"{}"#] {
            assert_eq!(
                age_from(parse(body)).unwrap_err().to_string(),
                "no age in response"
            );
        }
    }

    #[test]
    fn test_gender_requires_value() {
        assert_eq!(
            gender_from(parse(r#"{"gender":"male","probability":0.99}"#)),
            Ok("male".to_string())
        );
        assert_eq!(
            gender_from(parse(r#"{"gender":null}"#)).unwrap_err().to_string(),
            "no gender in response"
        );
    }

    #[test]
    fn test_nation_picks_most_probable_country() {
        let body = r#"{"country":[
            {"country_id":"UA","probability":0.30},
            {"country_id":"RU","probability":0.45},
            {"country_id":"BY","probability":0.45}
        ]}"#;
        assert_eq!(nation_from(parse(body)), Ok("RU".to_string()));
        assert_eq!(
            nation_from(parse(r#"{"country":[]}"#)).unwrap_err().to_string(),
            "no nation in response"
        );
    }

    #[test]
    fn test_config_rejects_empty_urls() {
        let config = MetadataConfig {
            genderize_url: String::new(),
            ..MetadataConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired {
                field: "PERSONA_GENDERIZE_URL".to_string()
            })
        );
        assert!(HttpMetadataProvider::new(config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_request_failure() {
        let provider = HttpMetadataProvider::new(MetadataConfig {
            agify_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..MetadataConfig::default()
        })
        .unwrap();
        let err = provider.age_by_name("ivan").await.unwrap_err();
        assert!(matches!(
            err,
            persona_core::PersonaError::Metadata(
                MetadataError::RequestFailed { provider: "agify", .. }
                    | MetadataError::Timeout { provider: "agify" }
            )
        ));
    }
}
