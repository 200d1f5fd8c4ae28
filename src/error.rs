//! 에러 타입
//!
//! 컴포넌트 경계에서 사용하는 타입 에러입니다.
//! CLI 및 조립 계층은 `anyhow`로 감싸서 전파합니다.

use thiserror::Error;

/// course-rag 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 강의 문서 헤더 형식 오류 (해당 문서만 실패)
    #[error("Failed to parse course document: {0}")]
    Parse(String),

    /// 지원하지 않는 파일 확장자
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// PDF/DOCX/파일 읽기 실패
    #[error("Failed to extract text from {path}: {message}")]
    Extraction { path: String, message: String },

    /// 벡터 저장소 접근 실패
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// 등록되지 않은 도구 호출
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    /// 도구 인자 누락/타입 오류
    #[error("Invalid tool arguments: {0}")]
    ToolArguments(String),

    /// LLM 완성 API 실패 (현재 질의에 치명적)
    #[error("Completion service error: {0}")]
    CompletionService(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

/// course-rag 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// 벡터 저장소 에러로 변환
    pub fn index(err: impl std::fmt::Display) -> Self {
        Self::IndexUnavailable(err.to_string())
    }

    /// 완성 서비스 에러로 변환
    pub fn completion(err: impl std::fmt::Display) -> Self {
        Self::CompletionService(err.to_string())
    }
}
