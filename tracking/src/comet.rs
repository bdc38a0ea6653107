use std::env;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{Result, Tracker, TrackingErr};

pub const API_KEY_ENV: &str = "COMET_API_KEY";
pub const WORKSPACE_ENV: &str = "COMET_WORKSPACE";
pub const URL_OVERRIDE_ENV: &str = "COMET_URL_OVERRIDE";

const DEFAULT_BASE_URL: &str = "https://www.comet.com";
const REST_PREFIX: &str = "/api/rest/v2/write/experiment";

/// How to reach the Comet REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CometConfig {
    pub api_key: String,
    pub workspace: Option<String>,
    pub base_url: String,
}

impl CometConfig {
    /// Reads `COMET_API_KEY` (required), `COMET_WORKSPACE` and `COMET_URL_OVERRIDE`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_ENV).map_err(|_| TrackingErr::MissingEnv(API_KEY_ENV))?;
        let workspace = env::var(WORKSPACE_ENV).ok().filter(|w| !w.is_empty());
        let base_url = env::var(URL_OVERRIDE_ENV)
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            workspace,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{REST_PREFIX}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    experiment_key: String,
    #[serde(default)]
    link: Option<String>,
}

/// Logs the experiment to Comet through its REST API.
pub struct CometTracker {
    client: reqwest::Client,
    config: CometConfig,
    key: String,
    ended: bool,
}

impl CometTracker {
    /// Registers a new experiment under `project_name`.
    pub async fn create(config: CometConfig, project_name: &str) -> Result<Self> {
        let client = reqwest::Client::new();

        let mut body = json!({ "projectName": project_name });
        if let Some(workspace) = &config.workspace {
            body["workspaceName"] = Value::from(workspace.as_str());
        }

        let created: Created = post(&client, &config, "create", &body).await?.json().await?;
        match &created.link {
            Some(link) => info!("comet experiment {} at {link}", created.experiment_key),
            None => info!("comet experiment {}", created.experiment_key),
        }

        Ok(Self {
            client,
            config,
            key: created.experiment_key,
            ended: false,
        })
    }

    async fn write(&self, path: &str, body: Value) -> Result<()> {
        if self.ended {
            return Err(TrackingErr::Ended);
        }

        post(&self.client, &self.config, path, &body).await?;
        Ok(())
    }
}

async fn post(
    client: &reqwest::Client,
    config: &CometConfig,
    path: &str,
    body: &Value,
) -> Result<reqwest::Response> {
    let endpoint = config.endpoint(path);
    debug!("POST {endpoint}");

    let response = client
        .post(&endpoint)
        .header(reqwest::header::AUTHORIZATION, &config.api_key)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrackingErr::Api {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

#[async_trait]
impl Tracker for CometTracker {
    fn experiment_key(&self) -> &str {
        &self.key
    }

    async fn log_other(&mut self, key: &str, value: Value) -> Result<()> {
        let value = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };

        let body = json!({
            "experimentKey": self.key,
            "key": key,
            "value": value,
        });
        self.write("log-other", body).await
    }

    async fn log_metric(&mut self, name: &str, value: f64, epoch: usize) -> Result<()> {
        let body = json!({
            "experimentKey": self.key,
            "metricName": name,
            "metricValue": value,
            "epoch": epoch,
            "timestamp": Utc::now().timestamp_millis(),
        });
        self.write("metric", body).await
    }

    async fn end(&mut self) -> Result<()> {
        self.ended = true;
        info!("comet experiment {} ended", self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_under_the_rest_prefix() {
        let config = CometConfig {
            api_key: "k".into(),
            workspace: None,
            base_url: "http://localhost:8080/".into(),
        };

        assert_eq!(
            config.endpoint("log-other"),
            "http://localhost:8080/api/rest/v2/write/experiment/log-other"
        );
    }
}
