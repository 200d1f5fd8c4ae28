//! 강의 문서 처리 모듈
//!
//! 파일 읽기 → 강의 문서 파싱 → 레슨별 청킹
//! - 텍스트 파일: UTF-8 (손실 허용)
//! - PDF 파일: pdf-extract
//! - DOCX 파일: zip + quick-xml

pub mod docx;
pub mod parser;
pub mod pdf;

use std::path::Path;

use crate::collector::FileType;
use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, SentenceChunker};
use crate::models::{Chunk, CourseDocument};

pub use parser::parse_course_document;

// ============================================================================
// Document Processor
// ============================================================================

/// 강의 문서 처리기
pub struct DocumentProcessor {
    chunker: SentenceChunker,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl DocumentProcessor {
    /// 청크 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            chunker: SentenceChunker::new(config),
        }
    }

    /// 크기/오버랩으로 생성
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(ChunkConfig::new(chunk_size, chunk_overlap))
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        self.chunker.config()
    }

    /// 파일에서 텍스트 읽기 (확장자로 디코더 선택)
    pub async fn read_file(&self, path: &Path) -> Result<String> {
        let file_type = FileType::from_path(path)
            .ok_or_else(|| RagError::UnsupportedFormat(path.display().to_string()))?;

        let extraction_error = |message: String| RagError::Extraction {
            path: path.display().to_string(),
            message,
        };

        match file_type {
            FileType::Text => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| extraction_error(e.to_string()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            FileType::Pdf => {
                // CPU 바운드이므로 spawn_blocking 사용
                let owned = path.to_path_buf();
                tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
                    .await
                    .map_err(|e| extraction_error(format!("PDF extraction task failed: {}", e)))?
                    .map_err(|e| extraction_error(format!("{:#}", e)))
            }
            FileType::Docx => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| extraction_error(e.to_string()))?;
                tokio::task::spawn_blocking(move || docx::extract_text_from_docx(&bytes))
                    .await
                    .map_err(|e| extraction_error(format!("DOCX extraction task failed: {}", e)))?
                    .map_err(|e| extraction_error(format!("{:#}", e)))
            }
        }
    }

    /// 강의 문서 처리: 읽기 → 파싱 → 청킹
    pub async fn process_course_document(
        &self,
        path: &Path,
    ) -> Result<(CourseDocument, Vec<Chunk>)> {
        let raw = self.read_file(path).await?;
        let course = parse_course_document(&raw)?;
        let chunks = self.chunk_course(&course);

        tracing::debug!(
            "Processed {:?}: '{}' ({} lessons, {} chunks)",
            path,
            course.title,
            course.lessons.len(),
            chunks.len()
        );

        Ok((course, chunks))
    }

    /// 모든 레슨 청킹 (레슨 순서대로)
    pub fn chunk_course(&self, course: &CourseDocument) -> Vec<Chunk> {
        course
            .lessons
            .iter()
            .flat_map(|lesson| {
                self.chunker
                    .chunk_lesson(&lesson.raw_text, &course.title, lesson.number)
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
