use crate::config::stage_config::SourceConfig;
use crate::utils::error::{Result, TaxonomyError};
use reqwest::Client;
use serde_json::json;

/// chat-completions 端點的薄封裝
///
/// 同步循序呼叫，一個提示一個請求；重試、快取、排程都交給上游服務。
pub struct ChatClient {
    client: Client,
    config: SourceConfig,
}

impl ChatClient {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// 送出一組 system + user 提示，回傳第一個 choice 的內容
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );

        let payload = json!({
            "model": self.config.qualified_model(),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": 0,
            "top_p": 1,
            "max_tokens": max_tokens,
            "presence_penalty": 0,
        });

        // 構建請求
        let mut request = self.client.post(&url).json(&payload);

        if let Some(api_key) = self.config.api_key() {
            request = request.bearer_auth(api_key);
        }

        if let Some(guid) = &self.config.scenario_guid {
            request = request.header("x-scenario-guid", guid);
        }

        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        if let Some(timeout) = self.config.timeout_seconds {
            request = request.timeout(std::time::Duration::from_secs(timeout));
        }

        tracing::debug!("📡 Chat request to {} (max_tokens: {})", url, max_tokens);

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("📡 Chat response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaxonomyError::ProcessingError {
                message: format!("Chat API returned status {}: {}", status, body),
            });
        }

        let body: serde_json::Value = response.json().await?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| TaxonomyError::ProcessingError {
                message: "Chat response missing choices[0].message.content".to_string(),
            })?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_config(endpoint: String) -> SourceConfig {
        SourceConfig {
            endpoint,
            model: "gpt-4o-2024-05-13".to_string(),
            use_dev_prefix: Some(true),
            api_key: None,
            scenario_guid: Some("fd004048-ba97-46c8-9b09-6f566bdcd2d7".to_string()),
            timeout_seconds: Some(30),
            headers: None,
        }
    }

    #[tokio::test]
    async fn test_complete_extracts_content() {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("x-scenario-guid", "fd004048-ba97-46c8-9b09-6f566bdcd2d7")
                .json_body_partial(r#"{"model": "dev-gpt-4o-2024-05-13", "temperature": 0}"#);
            then.status(200).json_body(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "solar, wind, tidal" } }
                ]
            }));
        });

        let client = ChatClient::new(test_config(server.url("")));
        let content = client
            .complete("You are helpful.", "Extract keywords.", 1000)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(content, "solar, wind, tidal");
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let client = ChatClient::new(test_config(server.url("")));
        let result = client.complete("sys", "user", 500).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_complete_missing_content() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(serde_json::json!({ "choices": [] }));
        });

        let client = ChatClient::new(test_config(server.url("")));
        let result = client.complete("sys", "user", 500).await;

        assert!(matches!(
            result,
            Err(TaxonomyError::ProcessingError { .. })
        ));
    }
}
