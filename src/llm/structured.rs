//! Single-shot completions that must come back as structured data.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::llm::json::{self, Recovery};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

const JSON_ONLY: &str = "Respond with a single JSON value and nothing else. \
No prose, no markdown, no code fences.";

/// Sampling parameters for one structured call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model override; `None` uses the provider default.
    pub model: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            model: None,
        }
    }
}

/// Client for instruction + payload → typed value calls.
#[derive(Clone)]
pub struct StructuredClient {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    light_model: Option<String>,
}

impl StructuredClient {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            light_model: None,
        }
    }

    /// Cheaper model used by [`GenerationParams`] from [`Self::light_params`].
    pub fn with_light_model(mut self, model: Option<String>) -> Self {
        self.light_model = model;
        self
    }

    /// Parameters targeting the light model, when one is configured.
    pub fn light_params(&self, temperature: f32, max_tokens: u32) -> GenerationParams {
        GenerationParams {
            temperature,
            max_tokens,
            model: self.light_model.clone(),
        }
    }

    /// Ask for a JSON value and decode it as `T`.
    ///
    /// Output goes through fence stripping, span extraction and structural
    /// repair before giving up with [`LlmError::MalformedResponse`].
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        instruction: &str,
        payload: &str,
        params: &GenerationParams,
    ) -> Result<T, LlmError> {
        let messages = vec![
            ChatMessage::system(format!("{}\n\n{}", instruction.trim(), JSON_ONLY)),
            ChatMessage::user(payload),
        ];
        let request = CompletionRequest::new(messages)
            .with_temperature(params.temperature)
            .with_max_tokens(params.max_tokens)
            .with_model(params.model.clone())
            .with_json_mode();

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout: self.timeout,
            })??;

        let (value, recovery) = json::parse_with_recovery::<T>(&response.content)?;
        if recovery != Recovery::Direct {
            tracing::debug!(
                ?recovery,
                output_tokens = response.output_tokens,
                "Structured completion needed recovery"
            );
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    use super::*;
    use crate::llm::{
        CompletionResponse, FinishReason, ToolCompletionRequest, ToolCompletionResponse,
    };

    struct CannedProvider {
        reply: String,
        delay: Duration,
        seen_models: Mutex<Vec<Option<String>>>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                delay: Duration::ZERO,
                seen_models: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.seen_models.lock().unwrap().push(req.model.clone());
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse {
                content: self.reply.clone(),
                finish_reason: FinishReason::Stop,
                input_tokens: 0,
                output_tokens: 0,
            })
        }

        async fn complete_with_tools(
            &self,
            _req: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            unreachable!("structured client never requests tools")
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Slot {
        start: String,
        score: f32,
    }

    #[tokio::test]
    async fn test_decodes_fenced_json() {
        let llm = Arc::new(CannedProvider::new(
            "```json\n{\"start\": \"09:00\", \"score\": 0.8}\n```",
        ));
        let client = StructuredClient::new(llm, Duration::from_secs(5));
        let slot: Slot = client
            .complete_json("suggest", "{}", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(
            slot,
            Slot {
                start: "09:00".to_string(),
                score: 0.8
            }
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_recovery_is_logged_at_debug() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let llm = Arc::new(CannedProvider::new("```json\n{\"start\": \"10:00\", \"score\": 0.5}\n```"));
        let client = StructuredClient::new(llm, Duration::from_secs(5));
        let _: Slot = client
            .complete_json("suggest", "{}", &GenerationParams::default())
            .await
            .unwrap();

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = logs
            .lines()
            .find(|l| l.contains("needed recovery"))
            .expect("recovery logged");
        assert!(line.contains("DEBUG"));
        assert!(!line.contains("INFO"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_error() {
        let llm = Arc::new(CannedProvider::new("Sorry, I can't do that."));
        let client = StructuredClient::new(llm, Duration::from_secs(5));
        let result: Result<Slot, _> = client
            .complete_json("suggest", "{}", &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(LlmError::MalformedResponse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let llm = Arc::new(CannedProvider {
            delay: Duration::from_secs(30),
            ..CannedProvider::new("{}")
        });
        let client = StructuredClient::new(llm, Duration::from_secs(1));
        let result: Result<serde_json::Value, _> = client
            .complete_json("x", "{}", &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_light_params_select_light_model() {
        let llm = Arc::new(CannedProvider::new("{}"));
        let client = StructuredClient::new(llm.clone(), Duration::from_secs(5))
            .with_light_model(Some("small-model".to_string()));
        let params = client.light_params(0.1, 256);
        let _: serde_json::Value = client.complete_json("x", "{}", &params).await.unwrap();
        assert_eq!(
            llm.seen_models.lock().unwrap().as_slice(),
            &[Some("small-model".to_string())]
        );
    }
}
