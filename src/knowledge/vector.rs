//! Vector Store - 최근접 이웃 저장소 트레이트 및 유틸리티
//!
//! 저장소는 텍스트를 받아 내부에서 임베딩합니다 (블랙박스 NN 저장소).
//! 컬렉션은 강의 카탈로그와 강의 콘텐츠 두 가지입니다.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// 필터 가능한 메타데이터 필드
pub const FIELD_COURSE_TITLE: &str = "course_title";
pub const FIELD_LESSON_NUMBER: &str = "lesson_number";

// ============================================================================
// Types
// ============================================================================

/// 컬렉션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// 강의당 1개 레코드 (강의명 해석용)
    CourseCatalog,
    /// 청크당 1개 레코드
    CourseContent,
}

impl Collection {
    /// 테이블 이름
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::CourseCatalog => "course_catalog",
            Collection::CourseContent => "course_content",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// 저장 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 컬렉션 내 고유 ID
    pub id: String,
    /// 임베딩 입력 겸 반환 문서
    pub document: String,
    /// 메타데이터 (JSON 객체)
    pub metadata: Map<String, Value>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    /// 거리 (작을수록 유사)
    pub distance: f32,
}

/// 메타데이터 필터
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    /// 필드 = 값
    Eq { field: String, value: Value },
    /// 모든 조건 충족
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// 동등 조건
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// 메타데이터가 조건을 만족하는지 확인
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            MetadataFilter::Eq { field, value } => metadata.get(field) == Some(value),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 최근접 이웃 저장소의 공통 인터페이스입니다.
/// 같은 ID로 upsert하면 마지막 쓰기가 남습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 upsert (임베딩은 저장소가 생성)
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize>;

    /// 텍스트로 최근접 이웃 검색
    async fn query(
        &self,
        collection: Collection,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// ID로 레코드 조회
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// 모든 레코드 ID
    async fn ids(&self, collection: Collection) -> Result<Vec<String>>;

    /// 레코드 개수
    async fn count(&self, collection: Collection) -> Result<usize>;

    /// 컬렉션 비우기
    async fn clear(&self, collection: Collection) -> Result<()>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
