use async_trait::async_trait;
use parley_config::ParleyConfig;
use parley_core::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A skill as the registry describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSkill {
    #[serde(default)]
    pub name: String,
    /// Absent in listings that only carry metadata.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
}

/// Registry acknowledgement of a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The remote skill registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every skill the registry offers.
    async fn list(&self) -> Result<Vec<RemoteSkill>>;

    /// One skill with its content. `DocumentNotFound` when the registry has none.
    async fn fetch(&self, name: &str) -> Result<RemoteSkill>;

    /// Create or update a skill in the registry.
    async fn publish(&self, name: &str, content: &str, source_agent: &str) -> Result<PublishAck>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<RemoteSkill>),
    Wrapped { skills: Vec<RemoteSkill> },
}

/// Registry client over the CRM's `/api/skills` endpoints.
pub struct HttpRegistry {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRegistry {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &ParleyConfig) -> Result<Self> {
        Self::new(
            &config.crm.endpoint,
            config.credentials.api_key(),
            Duration::from_secs(config.crm.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/skills{}", self.endpoint, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                ParleyError::RegistryUnavailable(format!("cannot reach {}: {e}", self.endpoint))
            })?;
        debug!(status = %response.status(), url = %response.url(), "registry responded");
        Ok(response)
    }

    async fn rejected(response: reqwest::Response) -> ParleyError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ParleyError::RegistryRejected { status, body }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status().as_u16();
        response
            .json::<T>()
            .await
            .map_err(|e| ParleyError::RegistryRejected {
                status,
                body: format!("unreadable response: {e}"),
            })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn list(&self) -> Result<Vec<RemoteSkill>> {
        let response = self.send(self.client.get(self.url(""))).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(match Self::decode::<ListResponse>(response).await? {
            ListResponse::Bare(skills) | ListResponse::Wrapped { skills } => skills,
        })
    }

    async fn fetch(&self, name: &str) -> Result<RemoteSkill> {
        let response = self
            .send(self.client.get(self.url(&format!("/{name}"))))
            .await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(ParleyError::DocumentNotFound(name.to_string())),
            s if s.is_success() => {
                let mut skill: RemoteSkill = Self::decode(response).await?;
                if skill.name.is_empty() {
                    skill.name = name.to_string();
                }
                Ok(skill)
            }
            _ => Err(Self::rejected(response).await),
        }
    }

    async fn publish(&self, name: &str, content: &str, source_agent: &str) -> Result<PublishAck> {
        let body = serde_json::json!({
            "name": name,
            "content": content,
            "source_agent": source_agent,
        });
        let response = self.send(self.client.post(self.url("")).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        // The registry may answer with an empty body.
        let text = response.text().await.unwrap_or_default();
        let version = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v["version"].as_str().map(String::from));
        Ok(PublishAck {
            name: name.to_string(),
            version,
        })
    }
}
