//! 설정 - 환경변수 기반
//!
//! | 변수 | 기본값 |
//! |------|--------|
//! | `OPENAI_API_KEY` | (필수) |
//! | `OPENAI_MODEL` | `gpt-4o-mini` |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `COURSE_RAG_EMBEDDING` | Gemini 키가 있으면 `gemini`, 없으면 `local` |
//! | `COURSE_RAG_STORE` | `lance` |
//! | `COURSE_RAG_DATA_DIR` | `{local data dir}/.course-rag` |

use std::path::PathBuf;

use crate::embedding::EmbeddingBackend;
use crate::error::{RagError, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// LanceDB (디스크)
    Lance,
    /// 메모리 (프로세스 종료 시 소멸)
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "lance" | "lancedb" => Some(Self::Lance),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// 데이터 디렉토리 경로
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".course-rag")
}

/// 시스템 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub embedding: EmbeddingBackend,
    pub store: StoreBackend,
    pub data_dir: PathBuf,
    /// 청크 최대 문자 수
    pub chunk_size: usize,
    /// 청크 간 오버랩 문자 수
    pub chunk_overlap: usize,
    /// 검색 결과 수
    pub max_results: usize,
    /// 세션당 보관할 교환 수
    pub max_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            embedding: EmbeddingBackend::Local,
            store: StoreBackend::Lance,
            data_dir: get_data_dir(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_results: crate::knowledge::DEFAULT_MAX_RESULTS,
            max_history: crate::session::DEFAULT_MAX_HISTORY,
        }
    }
}

impl Config {
    /// 환경변수에서 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 로드
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(key) = get("OPENAI_API_KEY") {
            config.openai_api_key = key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            config.openai_model = model;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }

        config.embedding = match get("COURSE_RAG_EMBEDDING") {
            Some(value) => EmbeddingBackend::parse(&value).ok_or_else(|| {
                RagError::Config(format!(
                    "COURSE_RAG_EMBEDDING must be 'gemini' or 'local', got '{}'",
                    value
                ))
            })?,
            None if GEMINI_KEY_VARS.iter().any(|var| get(var).is_some()) => {
                EmbeddingBackend::Gemini
            }
            None => EmbeddingBackend::Local,
        };

        if let Some(value) = get("COURSE_RAG_STORE") {
            config.store = StoreBackend::parse(&value).ok_or_else(|| {
                RagError::Config(format!(
                    "COURSE_RAG_STORE must be 'lance' or 'memory', got '{}'",
                    value
                ))
            })?;
        }

        if let Some(dir) = get("COURSE_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// 필수 값 및 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.trim().is_empty() {
            return Err(RagError::Config(
                "OPENAI_API_KEY environment variable is required. \
                 Set it in your shell or a .env loader before running."
                    .to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_results == 0 {
            return Err(RagError::Config("max_results must be positive".to_string()));
        }
        Ok(())
    }

    /// LanceDB 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("course_index.lance")
    }
}
