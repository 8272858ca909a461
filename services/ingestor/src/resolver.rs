//! Option contract token resolution
//!
//! Maps an (index, expiry, strike, option-type) leg to the contract
//! token the transport subscribes with. One external lookup per call;
//! "not found" is a normal empty result because the contract for a
//! given leg may simply not exist. No retry, no caching.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use types::topic::OptionType;

/// Errors from the token-resolution service.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("token lookup failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token lookup transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves one option leg to a subscribable contract token.
///
/// `Ok(None)` means the contract does not exist for that leg; errors
/// are logged by the caller and the leg is skipped, never fatal.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(
        &self,
        index_name: &str,
        expiry: &str,
        strike: i64,
        option_type: OptionType,
    ) -> Result<Option<String>, ResolveError>;
}

/// Response body of the token API.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// HTTP-backed resolver against the token API.
pub struct HttpTokenResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenResolver {
    /// Build a resolver with a bounded per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Query parameters for one leg lookup.
fn token_query(
    index_name: &str,
    expiry: &str,
    strike: i64,
    option_type: OptionType,
) -> [(&'static str, String); 4] {
    [
        ("index", index_name.to_string()),
        ("expiryDate", expiry.to_string()),
        ("optionType", option_type.as_str().to_string()),
        ("strikePrice", strike.to_string()),
    ]
}

#[async_trait]
impl TokenResolver for HttpTokenResolver {
    async fn resolve(
        &self,
        index_name: &str,
        expiry: &str,
        strike: i64,
        option_type: OptionType,
    ) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&token_query(index_name, expiry, strike, option_type))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.token.filter(|t| !t.is_empty()))
    }
}
