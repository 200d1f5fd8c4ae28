//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 벡터 저장소가 사용하는 임베딩 프로바이더입니다.
//! - Gemini API (원격, 레이트 리밋)
//! - 해시 임베딩 (로컬, 결정적)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(EmbeddingBackend::Local)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hash;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION};
pub use hash::HashEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서 임베딩과 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 임베딩 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Gemini API
    Gemini,
    /// 로컬 해시 임베딩
    Local,
}

impl EmbeddingBackend {
    /// 문자열에서 파싱 ("gemini" | "local")
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "local" | "hash" => Some(Self::Local),
            _ => None,
        }
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// Gemini API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
pub fn create_embedder(backend: EmbeddingBackend) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Gemini => Arc::new(GeminiEmbedding::from_env()?),
        EmbeddingBackend::Local => Arc::new(HashEmbedding::default()),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
