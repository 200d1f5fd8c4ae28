//! 답변 생성기 - 도구 호출 1회를 포함한 2단계 완성
//!
//! 1단계: 도구 정의와 함께 요청
//! 2단계: 도구 결과를 붙여 도구 없이 재요청 (응답 텍스트가 최종 답변)

use std::sync::Arc;

use serde_json::Value;

use crate::error::{RagError, Result};
use crate::llm::{
    Completion, CompletionRequest, CompletionService, FinishReason, Message, ToolCall,
    ToolDefinition,
};
use crate::tools::ToolManager;

/// 기본 시스템 프롬프트
pub const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in course materials and educational content, with access to tools for course information.

Tool usage:
- Use the course outline tool for questions about course structure, outlines, lesson lists or what a course covers
- Use the content search tool for questions about specific course content or detailed educational materials
- One round of tool calls per query at most
- Answer general knowledge questions directly without tools
- If a tool yields no results, say so clearly

Outline answers:
- Include the course title, the course link when available, and every lesson with its number and title

Response protocol:
- Provide direct, factual answers only
- Never mention tool processes or reasoning
- Never use phrases like \"based on the search results\" or \"according to the tool\"
- Keep responses brief and focused
- Include relevant examples when they help understanding
";

/// 기본 샘플링 온도
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
/// 기본 최대 토큰
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// 답변 생성기
pub struct AiGenerator {
    service: Arc<dyn CompletionService>,
    system_prompt: Arc<str>,
    temperature: f32,
    max_tokens: u32,
}

impl AiGenerator {
    /// 기본 프롬프트로 생성
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self::with_prompt(service, Arc::from(SYSTEM_PROMPT))
    }

    pub fn with_prompt(service: Arc<dyn CompletionService>, system_prompt: Arc<str>) -> Self {
        Self {
            service,
            system_prompt,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn model(&self) -> &str {
        self.service.model()
    }

    fn system_content(&self, history: Option<&str>) -> String {
        match history.filter(|h| !h.trim().is_empty()) {
            Some(history) => format!("{}\n\nPrevious conversation:\n{}", self.system_prompt, history),
            None => self.system_prompt.to_string(),
        }
    }

    async fn complete(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Result<Completion> {
        let request = CompletionRequest {
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.service
            .complete(&request)
            .await
            .map_err(|e| RagError::completion(format!("{:#}", e)))
    }

    /// 질의에 대한 답변 생성
    ///
    /// # Arguments
    /// * `query` - 사용자 질의
    /// * `history` - 이전 대화 (`User: …\nAssistant: …`)
    /// * `tools` - 도구 매니저 (없으면 도구 없이 1회 요청)
    pub async fn generate_response(
        &self,
        query: &str,
        history: Option<&str>,
        tools: Option<&ToolManager>,
    ) -> Result<String> {
        let mut messages = vec![
            Message::system(self.system_content(history)),
            Message::user(query),
        ];

        let definitions = tools.map(ToolManager::definitions).unwrap_or_default();
        let first = self.complete(messages.clone(), definitions).await?;

        let manager = match tools {
            Some(manager)
                if first.finish_reason == FinishReason::ToolCalls && !first.tool_calls.is_empty() =>
            {
                manager
            }
            _ => return Ok(first.content.unwrap_or_default()),
        };

        tracing::info!("Model requested {} tool call(s)", first.tool_calls.len());

        let results = execute_tool_calls(manager, &first.tool_calls).await;
        messages.push(Message::assistant_tool_calls(first.content, first.tool_calls));
        messages.extend(results);

        // 2단계: 도구 없음
        let second = self.complete(messages, Vec::new()).await?;

        if !second.tool_calls.is_empty() {
            tracing::warn!(
                "Dropping {} tool call(s) requested after tool round",
                second.tool_calls.len()
            );
        }

        Ok(second.content.unwrap_or_default())
    }
}

/// 도구 호출을 순서대로 실행하여 `tool` 메시지로 변환
///
/// 실패는 에러 문자열로 모델에 전달됩니다.
async fn execute_tool_calls(manager: &ToolManager, calls: &[ToolCall]) -> Vec<Message> {
    let mut results = Vec::with_capacity(calls.len());

    for call in calls {
        let name = call.function.name.as_str();
        let raw_args = if call.function.arguments.trim().is_empty() {
            "{}"
        } else {
            call.function.arguments.as_str()
        };

        let output = match serde_json::from_str::<Value>(raw_args) {
            Ok(args) => match manager.execute(name, &args).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!("Tool {} failed: {}", name, e);
                    format!("Error: {}", e)
                }
            },
            Err(e) => {
                tracing::warn!("Malformed arguments for {}: {}", name, e);
                format!("Error: Failed to parse tool arguments for {}: {}", name, e)
            }
        };

        results.push(Message::tool_result(call.id.clone(), output));
    }

    results
}

// ============================================================================
// Tests
// ============================================================================
