//! Client for the optional image rendering service.
//!
//! Rendering is a pass-through: the service builds a prompt from a poem and
//! relays the base64 image produced remotely.

use crate::config::RenderConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no rendering endpoint configured")]
    NotConfigured,

    #[error("rendering request failed: {0}")]
    Transport(String),

    #[error("rendering service answered {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    image: String,
}

/// Produces an image for a poem.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns a base64-encoded PNG.
    async fn render(&self, title: &str, body: &str) -> Result<String, RenderError>;
}

/// Prompt sent to the renderer: the title, then the body on one line.
pub fn render_prompt(title: &str, body: &str) -> String {
    format!("{title}. {}", body.replace('\n', " "))
}

/// Renderer that posts prompts to a remote HTTP endpoint.
pub struct HttpRenderer {
    client: Client,
    endpoint: String,
}

impl HttpRenderer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RenderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build from configuration. `None` when no endpoint is set.
    pub fn from_config(config: &RenderConfig) -> Result<Option<Self>, RenderError> {
        config
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .map(|endpoint| Self::new(endpoint, Duration::from_secs(config.timeout_secs)))
            .transpose()
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, title: &str, body: &str) -> Result<String, RenderError> {
        let prompt = render_prompt(title, body);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RenderRequest { prompt: &prompt })
            .send()
            .await
            .map_err(|e| RenderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload: RenderResponse = response
            .json()
            .await
            .map_err(|e| RenderError::Transport(e.to_string()))?;
        Ok(payload.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_flattens_newlines() {
        assert_eq!(
            render_prompt("Night", "dark sky\nbright star"),
            "Night. dark sky bright star"
        );
    }

    #[test]
    fn blank_endpoint_disables_rendering() {
        let config = RenderConfig {
            endpoint: Some("  ".into()),
            timeout_secs: 5,
        };
        assert!(HttpRenderer::from_config(&config).unwrap().is_none());
        assert!(HttpRenderer::from_config(&RenderConfig::default())
            .unwrap()
            .is_none());
    }
}
