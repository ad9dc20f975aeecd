//! HTTP adapter for the scoring service.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{ResponseClassifier, ScoringClient};
use crate::models::{AttemptResult, HexcoverError, LatLon, Result, ScoringConfig};

/// Point submission payload.
#[derive(Debug, Serialize)]
struct SubmitRequest {
    address: String,
}

/// Scoring client that POSTs `{"address": "<lat>,<lon>"}` to the service.
///
/// One request per call; retries and backoff belong to the scheduler.
pub struct HttpScoringClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    classifier: ResponseClassifier,
}

impl HttpScoringClient {
    /// Create a new scoring client.
    pub fn new(
        url: String,
        api_key: Option<String>,
        timeout: Duration,
        classifier: ResponseClassifier,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HexcoverError::Network)?;

        if let Some(key) = &api_key {
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                HexcoverError::InvalidInput("API key contains invalid header characters".into())
            })?;
        }

        Ok(Self {
            client,
            url,
            api_key,
            timeout,
            classifier,
        })
    }

    pub fn from_config(config: &ScoringConfig, api_key: Option<String>) -> Result<Self> {
        Self::new(
            config.url(),
            api_key,
            config.timeout(),
            ResponseClassifier::from_config(config),
        )
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(value) = self
            .api_key
            .as_ref()
            .and_then(|key| HeaderValue::from_str(&format!("Bearer {key}")).ok())
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn submit(&self, point: LatLon) -> AttemptResult {
        let request = SubmitRequest {
            address: point.as_query(),
        };

        let response = match self
            .client
            .post(&self.url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(point = %point, error = %e, "Request failed before a response");
                return self.classifier.classify_transport(&e, self.timeout);
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => self.classifier.classify(status, &body),
            Err(e) => self.classifier.classify_transport(&e, self.timeout),
        }
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
