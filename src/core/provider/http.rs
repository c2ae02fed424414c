use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{JobStatusProvider, ProviderConnector, ProviderError};
use crate::core::models::{Credentials, RawJobSnapshot};

/// Connects to the platform's REST job API.
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProviderConnector for HttpConnector {
    async fn bind(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn JobStatusProvider>, ProviderError> {
        if credentials.is_expired_at(Utc::now()) {
            return Err(ProviderError::TokenExpired);
        }

        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl(self.base_url.clone()));
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        debug!(base_url = %base_url, "Bound provider session");

        Ok(Arc::new(HttpProvider {
            base_url,
            access_token: credentials.access_token().to_string(),
            client,
        }))
    }
}

/// A provider session authenticated with a bearer token.
pub struct HttpProvider {
    base_url: Url,
    access_token: String,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Builds `<base>/jobs/<job_id>[/<action>]`. The job id is always a single
    /// percent-encoded path segment.
    fn job_url(&self, job_id: &str, action: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push("jobs").push(job_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    async fn check(
        job_id: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(job_id.to_string()));
        }

        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl JobStatusProvider for HttpProvider {
    async fn status(&self, job_id: &str) -> Result<RawJobSnapshot, ProviderError> {
        let response = self
            .client
            .get(self.job_url(job_id, None)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let body = Self::check(job_id, response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn request_cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.job_url(job_id, Some("cancel"))?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        Self::check(job_id, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_bind_rejects_expired_token() {
        let connector = HttpConnector::new("http://localhost:1", Duration::from_secs(1));
        let creds = Credentials::new("t", Some(Utc::now() - ChronoDuration::minutes(5)));

        let result = connector.bind(&creds).await;
        assert!(matches!(result, Err(ProviderError::TokenExpired)));
    }

    fn provider(base_url: &str) -> HttpProvider {
        HttpProvider {
            base_url: Url::parse(base_url).unwrap(),
            access_token: "t".into(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_job_url_handles_trailing_slash() {
        let with_slash = provider("http://example.test/api/");
        let without = provider("http://example.test/api");

        let expected = "http://example.test/api/jobs/T1/cancel";
        assert_eq!(with_slash.job_url("T1", Some("cancel")).unwrap().as_str(), expected);
        assert_eq!(without.job_url("T1", Some("cancel")).unwrap().as_str(), expected);
    }

    #[test]
    fn test_job_id_is_a_single_encoded_segment() {
        let provider = provider("http://example.test/");

        let url = provider.job_url("victim#x", Some("cancel")).unwrap();
        assert_eq!(url.path(), "/jobs/victim%23x/cancel");
        assert_eq!(url.fragment(), None);

        let url = provider.job_url("mine/../../jobs/victim", None).unwrap();
        assert_eq!(url.path(), "/jobs/mine%2F..%2F..%2Fjobs%2Fvictim");

        let url = provider.job_url("a?b=c", None).unwrap();
        assert_eq!(url.path(), "/jobs/a%3Fb=c");
        assert_eq!(url.query(), None);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_base_url() {
        let connector = HttpConnector::new("not a url", Duration::from_secs(1));
        let result = connector.bind(&Credentials::new("t", None)).await;
        assert!(matches!(result, Err(ProviderError::InvalidUrl(_))));
    }
}
