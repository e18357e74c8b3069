//! HTTP implementation of [`ChallengeApi`]

use crate::api::ChallengeApi;
use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use ladder_model::{
    CertificateEligibility, CertificateRecord, Challenge, HintResult, SubmissionPayload,
    SubmissionResult,
};
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// reqwest-backed client for the progression server
///
/// # Example
///
/// ```rust,no_run
/// use ladder_client::{ApiConfig, ChallengeApi, HttpChallengeApi};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let api = HttpChallengeApi::new(ApiConfig::new("http://localhost:8000/api").with_token("t0k"))?;
/// let challenges = api.list_challenges().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpChallengeApi {
    base: Url,
    client: Client,
}

impl HttpChallengeApi {
    /// Create a client
    ///
    /// # Errors
    /// `ClientError::InvalidConfig` when the base URL cannot be parsed or the
    /// token is not a valid header value.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "base_url cannot carry paths: {}",
                config.base_url
            )));
        }

        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::InvalidConfig(format!("token: {e}")))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { base, client })
    }

    /// Base URL in use
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig("base_url cannot carry paths".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(method = "GET", url = %url, "challenge api request");
        let response = self.client.get(url).send().await?;
        handle_response(response).await
    }

    async fn post(&self, url: Url, body: Option<&SubmissionPayload>) -> Result<Response> {
        debug!(method = "POST", url = %url, "challenge api request");
        let request = self.client.post(url);
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        Ok(request.send().await?)
    }
}

#[async_trait::async_trait]
impl ChallengeApi for HttpChallengeApi {
    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        self.get_json(self.url(&["challenges"])?).await
    }

    async fn get_challenge(&self, slug: &str) -> Result<Challenge> {
        self.get_json(self.url(&["challenges", slug])?).await
    }

    async fn submit(&self, slug: &str, payload: &SubmissionPayload) -> Result<SubmissionResult> {
        let url = self.url(&["challenges", slug, "submit"])?;
        let response = self.post(url, Some(payload)).await?;
        handle_response(response).await
    }

    async fn purchase_hint(&self, slug: &str) -> Result<HintResult> {
        let url = self.url(&["challenges", slug, "purchase_ai_assist"])?;
        let response = self.post(url, None).await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::PAYMENT_REQUIRED {
            let message = error_message(&response.text().await.unwrap_or_default());
            warn!(slug, status = status.as_u16(), %message, "hint purchase refused");
            if status == StatusCode::PAYMENT_REQUIRED || mentions_funds(&message) {
                return Err(ClientError::InsufficientFunds { message });
            }
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }
        handle_response(response).await
    }

    async fn certificate_eligibility(&self) -> Result<CertificateEligibility> {
        self.get_json(self.url(&["certificates", "check_eligibility"])?)
            .await
    }

    async fn my_certificate(&self) -> Result<Option<CertificateRecord>> {
        let url = self.url(&["certificates", "my_certificate"])?;
        debug!(method = "GET", url = %url, "challenge api request");
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<Option<CertificateRecord>>(&body)?)
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(response.url().path().to_string()));
    }

    if !response.status().is_success() {
        return Err(server_error(response).await);
    }

    let body = response.json().await?;
    Ok(body)
}

async fn server_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Server {
        status,
        message: error_message(&body),
    }
}

/// Whether a 400 refusal is about the learner's balance
fn mentions_funds(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["insufficient", "not enough", "coin", "fund", "balance"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Pull a readable message out of an error body
///
/// Accepts `{"detail": ..}`, `{"error": ..}` and `{"message": ..}`, otherwise
/// returns the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_urls() {
        let api = HttpChallengeApi::new(ApiConfig::new("http://localhost:8000/api/")).unwrap();
        let url = api.url(&["challenges", "hello world", "submit"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/challenges/hello%20world/submit"
        );
    }

    #[test]
    fn rejects_unparseable_base() {
        let result = HttpChallengeApi::new(ApiConfig::new("not a url"));
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_token_with_newline() {
        let result = HttpChallengeApi::new(ApiConfig::default().with_token("bad\ntoken"));
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn recognizes_balance_refusals() {
        assert!(mentions_funds("Not enough coins"));
        assert!(mentions_funds("Insufficient balance"));
        assert!(!mentions_funds("Hints are disabled for this challenge"));
        assert!(!mentions_funds(""));
    }

    #[test]
    fn extracts_error_messages() {
        assert_eq!(error_message(r#"{"detail":"Not enough coins"}"#), "Not enough coins");
        assert_eq!(error_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(error_message("  plain text \n"), "plain text");
        assert_eq!(error_message(r#"{"detail": 5}"#), r#"{"detail": 5}"#);
    }
}
