//! OpenAI 호환 chat completions 클라이언트
//!
//! `POST {base_url}/chat/completions`, Bearer 인증.
//! ref: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    Completion, CompletionRequest, CompletionService, FinishReason, Message, ToolCall,
    ToolDefinition,
};

/// 완성 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI 호환 완성 서비스
#[derive(Debug)]
pub struct OpenAiCompletion {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// 없거나 null일 수 있음
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiCompletion {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            tools: request
                .tools
                .iter()
                .map(|function| ToolSpec {
                    kind: "function",
                    function,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// 응답 본문 파싱
fn parse_response(body: &str) -> Result<Completion> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("Failed to parse completion response")?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No choices in completion response"))?;

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::parse)
        .unwrap_or(FinishReason::Stop);

    Ok(Completion {
        content: choice.message.content,
        finish_reason,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    })
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = self.build_body(request);

        tracing::debug!(
            "Completion request: {} messages, {} tools",
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!("Completion API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("Completion API error ({}): {}", status, text);
        }

        parse_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn client() -> OpenAiCompletion {
        OpenAiCompletion::new("sk-test", "https://api.example.com/v1/", "gpt-4o-mini").unwrap()
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(client().endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_body_omits_empty_tools() {
        let client = client();
        let request = CompletionRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: 0.0,
            max_tokens: 800,
        };

        let body: Value = serde_json::to_value(client.build_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 800);
    }

    #[test]
    fn test_body_wraps_tools() {
        let client = client();
        let request = CompletionRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "get_course_outline".to_string(),
                description: "Outline".to_string(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.0,
            max_tokens: 800,
        };

        let body: Value = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_course_outline");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "search_course_content", "arguments": "{\"query\":\"MCP\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();

        let completion = parse_response(&body).unwrap();
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls[0].id, "call_abc");
        assert_eq!(completion.tool_calls[0].function.arguments, "{\"query\":\"MCP\"}");
    }

    #[test]
    fn test_parse_text_response_and_empty_choices() {
        let body = json!({
            "choices": [{"message": {"content": "Answer."}, "finish_reason": "stop"}]
        })
        .to_string();
        let completion = parse_response(&body).unwrap();
        assert_eq!(completion.content.as_deref(), Some("Answer."));
        assert!(completion.tool_calls.is_empty());

        assert!(parse_response(r#"{"choices": []}"#).is_err());
    }
}
