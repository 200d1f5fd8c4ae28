//! course-rag - 강의 자료 RAG 질의응답 시스템
//!
//! 강의 문서(텍스트/PDF/DOCX)를 레슨 단위로 파싱하고 문장 단위로 청킹하여
//! 카탈로그/콘텐츠 두 컬렉션(LanceDB 또는 메모리)에 인덱싱합니다.
//! 질의는 도구 호출(콘텐츠 검색, 강의 개요)이 가능한 채팅 모델로 답변합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod rag;
pub mod session;
pub mod tools;

// Re-exports
pub use collector::{CollectedFile, CollectorConfig, FileCollector, FileType};
pub use config::{Config, StoreBackend, get_data_dir};
pub use document::{DocumentProcessor, parse_course_document};
pub use embedding::{
    EmbeddingBackend, EmbeddingProvider, GeminiEmbedding, HashEmbedding, create_embedder,
    get_api_key, has_api_key,
};
pub use error::{RagError, Result};
pub use generator::AiGenerator;
pub use knowledge::{
    ChunkConfig, Chunker, CourseIndex, LanceVectorStore, MemoryVectorStore, SearchResults,
    SentenceChunker, VectorStore, chunk_text,
};
pub use llm::{CompletionService, OpenAiCompletion};
pub use models::{Chunk, CourseDocument, CourseOutline, Lesson, Source};
pub use rag::{Answer, CourseAnalytics, IngestStats, RagSystem, open_index};
pub use session::SessionManager;
pub use tools::{CourseOutlineTool, CourseSearchTool, Tool, ToolManager};
