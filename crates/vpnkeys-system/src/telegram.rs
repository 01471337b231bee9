//! Telegram Bot API delivery

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use vpnkeys_core::{CollaboratorError, CredentialBundle};

const API_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramBot {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramBot {
    pub fn new(timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Point the bot at another Bot API server
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn send_document(
        &self,
        token: &str,
        chat_id: &str,
        bundle: &CredentialBundle,
        caption: &str,
    ) -> Result<(), CollaboratorError> {
        let document = Part::bytes(bundle.contents.clone()).file_name(bundle.file_name.clone());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .client
            .post(self.method_url(token, "sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CollaboratorError(format!("Telegram request failed: {}", e.without_url())))?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError(format!("Telegram returned {}: {}", status, e)))?;
        if !body.ok {
            return Err(CollaboratorError(format!(
                "Telegram rejected document: {}",
                body.description.unwrap_or_else(|| status.to_string())
            )));
        }

        debug!("Sent {} to chat {}", bundle.file_name, chat_id);
        Ok(())
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, token, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let bot = TelegramBot::new(Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://localhost:8081/");
        assert_eq!(
            bot.method_url("123:abc", "sendDocument"),
            "http://localhost:8081/bot123:abc/sendDocument"
        );
    }
}
