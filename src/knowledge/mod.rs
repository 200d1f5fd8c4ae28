//! Knowledge 모듈 - 강의 검색 인덱스
//!
//! - Chunker: 문장 단위 분할 + 오버랩
//! - VectorStore: 최근접 이웃 저장소 트레이트 (LanceDB / 메모리)
//! - CourseIndex: 강의 카탈로그 + 콘텐츠 이중 인덱스

mod chunker;
mod index;
mod lance;
mod memory;
mod vector;

// Re-exports
pub use chunker::{
    chunk_text, ChunkConfig, Chunker, SentenceChunker, SentenceSplitter, DEFAULT_ABBREVIATIONS,
};
pub use index::{ChunkMetadata, CourseIndex, SearchResults, DEFAULT_MAX_RESULTS};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use vector::{
    cosine_similarity, Collection, MetadataFilter, Record, SearchHit, VectorStore,
    FIELD_COURSE_TITLE, FIELD_LESSON_NUMBER,
};
