//! JSON-over-HTTP providers.
//!
//! Each provider is rooted at a base URL:
//!
//! | Provider   | Request                                             |
//! |------------|-----------------------------------------------------|
//! | datasource | `GET  {base}/datasources`, `POST {base}/datasources` |
//! | datasource | `GET  {base}/datasources/{id}`                      |
//! | datasource | `GET  {base}/datasources/{id}/entries?start=&end=`  |
//! | trainer    | `POST {base}/train`                                 |
//! | predictor  | `POST {base}/invoke`                                |
//! | deployer   | `POST {base}/deploy`, `POST {base}/undeploy`        |

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    Datasource, DatasourceProvider, DeploymentProvider, Prediction, PredictionRequest, Predictor,
    TimeSeries, Trainer, TrainingOutcome, TrainingRequest,
};
use crate::config::ProviderConfig;
use crate::error::{MaioError, Result};

/// Shared client plumbing: base URL, timeout and status checking.
#[derive(Clone)]
struct Endpoint {
    service: &'static str,
    client: Client,
    base: Url,
}

impl Endpoint {
    fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).map_err(|e| MaioError::Config {
            message: format!("Invalid {} URL '{}': {}", service, base_url, e),
        })?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("maio-ml/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MaioError::Config {
                message: format!("Failed to create HTTP client for {}: {}", service, e),
            })?;

        Ok(Self {
            service,
            client,
            base,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| MaioError::Config {
            message: format!("Invalid {} path '{}': {}", self.service, path, e),
        })
    }

    fn transport_error(&self, url: &Url, err: reqwest::Error) -> MaioError {
        MaioError::External {
            service: self.service,
            message: format!("{} failed: {}", url, err),
        }
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MaioError::External {
            service: self.service,
            message: format!("HTTP {}: {}", status, body.trim()),
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let url = self.url(path)?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let response = self.check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| self.transport_error(&url, e))
    }
}

/// Datasource provider backed by the datasource service.
pub struct HttpDatasources {
    endpoint: Endpoint,
}

impl HttpDatasources {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("datasource", base_url, ProviderConfig::REQUEST_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl DatasourceProvider for HttpDatasources {
    async fn get_datasource(&self, id: i64) -> Result<Option<Datasource>> {
        let url = self.endpoint.url(&format!("datasources/{}", id))?;
        let response = self
            .endpoint
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.endpoint.check(response).await?;
        let datasource = response
            .json::<Datasource>()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))?;
        Ok(Some(datasource))
    }

    async fn list_datasources(&self) -> Result<Vec<Datasource>> {
        let url = self.endpoint.url("datasources")?;
        let response = self
            .endpoint
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))?;
        let response = self.endpoint.check(response).await?;
        response
            .json::<Vec<Datasource>>()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))
    }

    async fn create_datasource(&self, name: &str) -> Result<Datasource> {
        self.endpoint
            .post_json("datasources", &serde_json::json!({ "name": name }))
            .await
    }

    async fn get_tag_entries(
        &self,
        datasource_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries> {
        let mut url = self
            .endpoint
            .url(&format!("datasources/{}/entries", datasource_id))?;
        url.query_pairs_mut()
            .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Secs, true));

        let response = self
            .endpoint
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))?;
        let response = self.endpoint.check(response).await?;
        response
            .json::<TimeSeries>()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))
    }
}

/// Trainer that submits jobs to the training service.
pub struct HttpTrainer {
    endpoint: Endpoint,
}

impl HttpTrainer {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("trainer", base_url, ProviderConfig::TRAINING_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl Trainer for HttpTrainer {
    async fn submit_training(&self, request: &TrainingRequest) -> Result<TrainingOutcome> {
        self.endpoint.post_json("train", request).await
    }
}

/// Predictor that calls the inference service.
pub struct HttpPredictor {
    endpoint: Endpoint,
}

impl HttpPredictor {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("predictor", base_url, ProviderConfig::REQUEST_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn invoke(&self, request: &PredictionRequest) -> Result<Prediction> {
        self.endpoint.post_json("invoke", request).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployBody<'a> {
    version_id: i64,
    artifact_ref: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployReply {
    endpoint_ref: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UndeployBody<'a> {
    endpoint_ref: &'a str,
}

/// Deployment provider backed by the provisioning service.
pub struct HttpDeployer {
    endpoint: Endpoint,
}

impl HttpDeployer {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new("deployer", base_url, ProviderConfig::REQUEST_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl DeploymentProvider for HttpDeployer {
    async fn deploy(&self, version_id: i64, artifact_ref: Option<&str>) -> Result<String> {
        let reply: DeployReply = self
            .endpoint
            .post_json(
                "deploy",
                &DeployBody {
                    version_id,
                    artifact_ref,
                },
            )
            .await?;
        Ok(reply.endpoint_ref)
    }

    async fn undeploy(&self, endpoint_ref: &str) -> Result<()> {
        let url = self.endpoint.url("undeploy")?;
        let response = self
            .endpoint
            .client
            .post(url.clone())
            .json(&UndeployBody { endpoint_ref })
            .send()
            .await
            .map_err(|e| self.endpoint.transport_error(&url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Endpoint {} already gone", endpoint_ref);
            return Ok(());
        }
        self.endpoint.check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let endpoint = Endpoint::new(
            "trainer",
            "http://ml.internal:8080/api/v1",
            ProviderConfig::REQUEST_TIMEOUT,
        )
        .unwrap();
        assert_eq!(
            endpoint.url("train").unwrap().as_str(),
            "http://ml.internal:8080/api/v1/train"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpTrainer::new("not a url").err().unwrap();
        assert!(matches!(err, MaioError::Config { .. }));
        assert!(err.is_internal());
    }
}
