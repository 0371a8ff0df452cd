use async_trait::async_trait;
use chrono::Utc;
use parley_config::ParleyConfig;
use parley_core::{MessageOrigin, ParleyError, Result, ThreadId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Payload of `POST /api/agents/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub default: bool,
}

/// The CRM collaborator: where replies and failures are streamed, and where
/// the listener announces itself.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn forward_reply(&self, thread: &ThreadId, origin: &MessageOrigin, reply: &str)
    -> Result<()>;

    async fn forward_error(&self, thread: &ThreadId, origin: &MessageOrigin, error: &str)
    -> Result<()>;

    async fn register(&self, registration: &Registration) -> Result<()>;
}

/// CRM client over HTTP, authenticated with `X-API-Key`.
pub struct HttpCrm {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    agent_name: String,
}

impl HttpCrm {
    pub fn new(endpoint: &str, api_key: &str, agent_name: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent_name: agent_name.to_string(),
        })
    }

    pub fn from_config(config: &ParleyConfig) -> Result<Self> {
        Self::new(
            &config.crm.endpoint,
            config.credentials.api_key(),
            &config.agent.name,
            Duration::from_secs(config.crm.request_timeout_secs),
        )
    }

    fn envelope(&self, thread: &ThreadId, origin: &MessageOrigin) -> serde_json::Value {
        serde_json::json!({
            "thread_id": thread,
            "sender": origin.sender,
            "channel": origin.channel,
            "timestamp": Utc::now().to_rfc3339(),
            "agent": self.agent_name,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::RegistryUnavailable(format!("cannot reach {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::RegistryRejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, %status, "crm accepted");
        Ok(())
    }
}

#[async_trait]
impl CrmClient for HttpCrm {
    async fn forward_reply(
        &self,
        thread: &ThreadId,
        origin: &MessageOrigin,
        reply: &str,
    ) -> Result<()> {
        let mut assistant = self.envelope(thread, origin);
        assistant["message"] = serde_json::json!({
            "type": "assistant",
            "content": [{ "type": "text", "text": reply }],
        });
        let streamed = self.post("/api/agent/stream", &assistant).await;

        // The result marker is sent even when the assistant message was refused.
        let mut result = self.envelope(thread, origin);
        result["message"] = serde_json::json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "num_turns": 1,
        });
        let finished = self.post("/api/agent/stream", &result).await;
        streamed.and(finished)
    }

    async fn forward_error(
        &self,
        thread: &ThreadId,
        origin: &MessageOrigin,
        error: &str,
    ) -> Result<()> {
        let mut body = self.envelope(thread, origin);
        body["error"] = serde_json::Value::String(error.to_string());
        self.post("/api/agent/error", &body).await
    }

    async fn register(&self, registration: &Registration) -> Result<()> {
        let body = serde_json::to_value(registration)?;
        self.post("/api/agents/register", &body).await
    }
}

/// Address to advertise: `crm.advertise_ip`, else the first line of
/// `tailscale ip -4`.
pub async fn discover_ip(advertise_ip: Option<&str>) -> Option<String> {
    if let Some(ip) = advertise_ip.filter(|ip| !ip.trim().is_empty()) {
        return Some(ip.trim().to_string());
    }
    let output = tokio::process::Command::new("tailscale")
        .args(["ip", "-4"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        Ok(out) => {
            warn!(status = %out.status, "tailscale ip -4 failed");
            None
        }
        Err(e) => {
            warn!(error = %e, "tailscale not available");
            None
        }
    }
}

/// Register with the CRM, retrying up to `crm.register_retries` times.
/// Returns whether registration succeeded; failure is never fatal.
pub async fn register_with_retries(crm: Arc<dyn CrmClient>, config: &ParleyConfig) -> bool {
    let Some(ip) = discover_ip(config.crm.advertise_ip.as_deref()).await else {
        warn!("no address to advertise, skipping CRM registration");
        return false;
    };
    let Some(addr) = config.server.socket_addr() else {
        warn!(listen = %config.server.listen, "listen address unparsable, skipping CRM registration");
        return false;
    };
    let registration = Registration {
        name: config.agent.name.clone(),
        ip,
        port: addr.port(),
        default: false,
    };

    let attempts = config.crm.register_retries.max(1);
    for attempt in 1..=attempts {
        match crm.register(&registration).await {
            Ok(()) => {
                info!(
                    agent = %registration.name,
                    ip = %registration.ip,
                    port = registration.port,
                    "registered with CRM"
                );
                return true;
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "CRM registration failed");
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_secs(config.crm.register_delay_secs)).await;
                }
            }
        }
    }
    false
}
