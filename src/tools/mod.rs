//! 도구 모듈 - 모델이 호출하는 검색 도구
//!
//! - `search_course_content`: 강의 콘텐츠 검색 (강의/레슨 필터)
//! - `get_course_outline`: 강의 개요 (레슨 목록)
//!
//! 각 도구는 마지막 실행의 출처를 보관합니다 (덮어쓰기, 읽은 뒤 초기화).

mod outline;
mod search;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RagError, Result};
use crate::llm::ToolDefinition;
use crate::models::Source;

pub use outline::CourseOutlineTool;
pub use search::CourseSearchTool;

// ============================================================================
// Tool Trait
// ============================================================================

/// 도구 트레이트
#[async_trait]
pub trait Tool: Send + Sync {
    /// 모델에 제공할 정의 (이름은 매니저 내에서 고유)
    fn definition(&self) -> ToolDefinition;

    /// JSON 인자로 실행
    async fn execute(&self, args: &Value) -> Result<String>;

    /// 마지막 실행의 출처
    fn last_sources(&self) -> Vec<Source> {
        Vec::new()
    }

    fn reset_sources(&self) {}
}

// ============================================================================
// Source Mailbox
// ============================================================================

/// 단일 슬롯 출처 보관함
#[derive(Debug, Default)]
pub struct SourceMailbox {
    slot: Mutex<Vec<Source>>,
}

impl SourceMailbox {
    /// 이전 내용을 덮어씀
    pub fn store(&self, sources: Vec<Source>) {
        *self.lock() = sources;
    }

    pub fn get(&self) -> Vec<Source> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Source>> {
        // 패닉으로 오염되어도 출처 목록은 그대로 사용
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tool Manager
// ============================================================================

/// 도구 레지스트리
#[derive(Default)]
pub struct ToolManager {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 도구 등록 (같은 이름은 마지막 등록이 유지)
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.definition().name;
        if name.trim().is_empty() {
            return Err(RagError::Config("Tool must have a name".to_string()));
        }

        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!("Replaced tool registration: {}", name);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 도구 정의 목록 (이름순)
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.sorted_tools().map(|tool| tool.definition()).collect()
    }

    /// 이름으로 도구 실행
    pub async fn execute(&self, name: &str, args: &Value) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RagError::UnknownTool(name.to_string()))?;

        tracing::debug!("Executing tool {} with {}", name, args);
        tool.execute(args).await
    }

    /// 출처를 가진 첫 번째 도구의 출처 (이름순)
    pub fn last_sources(&self) -> Vec<Source> {
        self.sorted_tools()
            .map(|tool| tool.last_sources())
            .find(|sources| !sources.is_empty())
            .unwrap_or_default()
    }

    /// 모든 도구의 출처 초기화
    pub fn reset_sources(&self) {
        for tool in self.tools.values() {
            tool.reset_sources();
        }
    }

    fn sorted_tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        let mut entries: Vec<_> = self.tools.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, tool)| tool)
    }
}

// ============================================================================
// Argument Helpers
// ============================================================================

/// 필수 문자열 인자
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(RagError::ToolArguments(
            format!("missing required argument '{}'", key),
        )),
        Some(other) => Err(RagError::ToolArguments(format!(
            "argument '{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// 선택 문자열 인자 (빈 문자열은 없음으로 취급)
pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(RagError::ToolArguments(format!(
            "argument '{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// 선택 정수 인자 (0 이상)
pub(crate) fn optional_u32(args: &Value, key: &str) -> Result<Option<u32>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                RagError::ToolArguments(format!(
                    "argument '{}' must be a non-negative integer, got {}",
                    key, value
                ))
            }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        name: &'static str,
        sources: SourceMailbox,
    }

    impl EchoTool {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                sources: SourceMailbox::default(),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.to_string(),
                description: format!("echo from {}", self.name),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, args: &Value) -> Result<String> {
            let text = required_str(args, "text")?;
            self.sources
                .store(vec![Source::for_lesson(self.name, None, None)]);
            Ok(format!("{}:{}", self.name, text))
        }

        fn last_sources(&self) -> Vec<Source> {
            self.sources.get()
        }

        fn reset_sources(&self) {
            self.sources.clear();
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(EchoTool::new("echo"))).unwrap();

        let result = manager.execute("echo", &json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, "echo:hi");
        assert_eq!(manager.definitions().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let manager = ToolManager::new();
        let err = manager.execute("missing", &json!({})).await.unwrap_err();
        assert!(matches!(err, RagError::UnknownTool(ref name) if name == "missing"));
        assert_eq!(err.to_string(), "Tool 'missing' not found");
    }

    #[test]
    fn test_register_last_wins_and_empty_name() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(EchoTool::new("echo"))).unwrap();
        manager.register(Arc::new(EchoTool::new("echo"))).unwrap();
        assert_eq!(manager.len(), 1);

        let err = manager.register(Arc::new(EchoTool::new(""))).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn test_sources_read_and_reset() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(EchoTool::new("a_tool"))).unwrap();
        manager.register(Arc::new(EchoTool::new("b_tool"))).unwrap();
        assert!(manager.last_sources().is_empty());

        manager.execute("b_tool", &json!({"text": "x"})).await.unwrap();
        assert_eq!(manager.last_sources()[0].label, "b_tool");

        manager.reset_sources();
        assert!(manager.last_sources().is_empty());
    }

    #[test]
    fn test_argument_helpers() {
        let args = json!({"query": "mcp", "blank": " ", "lesson": 3, "neg": -1, "num": 5});

        assert_eq!(required_str(&args, "query").unwrap(), "mcp");
        assert!(required_str(&args, "blank").is_err());
        assert!(required_str(&args, "absent").is_err());
        assert!(required_str(&args, "num").is_err());

        assert_eq!(optional_str(&args, "blank").unwrap(), None);
        assert_eq!(optional_u32(&args, "lesson").unwrap(), Some(3));
        assert_eq!(optional_u32(&args, "absent").unwrap(), None);
        assert!(matches!(
            optional_u32(&args, "neg"),
            Err(RagError::ToolArguments(_))
        ));
    }
}
