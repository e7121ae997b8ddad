use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::models::{ChatRequest, OllamaChatRequest, OllamaChatResponse};

/// The expensive call sitting behind the cache.
///
/// Implementations must be cancel safe: dropping the returned future must not
/// leave anything half done on the caller's side.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    async fn call(&self, request: &ChatRequest) -> Result<String, RemoteError>;
}

#[async_trait]
impl<T: RemoteCall + ?Sized> RemoteCall for Arc<T> {
    async fn call(&self, request: &ChatRequest) -> Result<String, RemoteError> {
        (**self).call(request).await
    }
}

// Chat client for a single Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        // add http:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn wire_request<'a>(request: &'a ChatRequest) -> OllamaChatRequest<'a> {
        let mut options: serde_json::Map<String, serde_json::Value> = request
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(seed) = request.seed {
            options.insert("seed".into(), seed.into());
        }
        if request.max_tokens > 0 {
            options.insert("num_predict".into(), request.max_tokens.into());
        }

        OllamaChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            options,
        }
    }
}

#[async_trait]
impl RemoteCall for OllamaClient {
    async fn call(&self, request: &ChatRequest) -> Result<String, RemoteError> {
        let res = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&Self::wire_request(request))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = match res.text().await {
                Ok(body) => body,
                Err(e) => format!("<unreadable body: {}>", e),
            };
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: OllamaChatResponse = res
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use serde_json::json;

    #[test]
    fn test_base_url_normalized() {
        let client = reqwest::Client::new();
        assert_eq!(
            OllamaClient::new(client.clone(), "localhost:11434").base_url(),
            "http://localhost:11434"
        );
        assert_eq!(
            OllamaClient::new(client, "https://ollama.internal/").base_url(),
            "https://ollama.internal"
        );
    }

    #[test]
    fn test_wire_request_maps_options() {
        let request = ChatRequest::new("llama3", vec![ChatMessage::user("hi")])
            .with_seed(7)
            .with_max_tokens(64)
            .with_option("temperature", json!(0.0));

        let wire = serde_json::to_value(OllamaClient::wire_request(&request)).unwrap();
        assert_eq!(
            wire,
            json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
                "options": {"seed": 7, "num_predict": 64, "temperature": 0.0}
            })
        );
    }

    #[test]
    fn test_wire_request_omits_unset_limits() {
        let request = ChatRequest::new("llama3", vec![ChatMessage::user("hi")]);
        let wire = serde_json::to_value(OllamaClient::wire_request(&request)).unwrap();
        assert_eq!(wire["options"], json!({}));
    }
}
