//! Course Index - 강의 카탈로그 + 콘텐츠 이중 인덱스
//!
//! - 카탈로그: 강의당 레코드 1개, 문서 텍스트는 강의 제목 (강의명 퍼지 해석용)
//! - 콘텐츠: 청크당 레코드 1개, 강의/레슨 메타데이터 필터 검색
//!
//! 검색 실패는 예외가 아니라 `SearchResults::error` 로 반환합니다.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{RagError, Result};
use crate::models::{Chunk, CourseDocument, CourseOutline, LessonSummary};

use super::vector::{
    Collection, MetadataFilter, Record, SearchHit, VectorStore, FIELD_COURSE_TITLE,
    FIELD_LESSON_NUMBER,
};

/// 기본 검색 결과 수
pub const DEFAULT_MAX_RESULTS: usize = 5;

// ============================================================================
// SearchResults
// ============================================================================

/// 콘텐츠 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: Option<u32>,
}

impl ChunkMetadata {
    fn from_map(metadata: &Map<String, Value>) -> Self {
        let as_u32 = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };

        Self {
            course_title: metadata
                .get(FIELD_COURSE_TITLE)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            lesson_number: as_u32(FIELD_LESSON_NUMBER),
            chunk_index: as_u32("chunk_index"),
        }
    }
}

/// 검색 결과 (문서/메타데이터/거리가 같은 순서)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
    pub error: Option<String>,
}

impl SearchResults {
    /// 저장소 검색 결과에서 생성
    pub fn from_hits(hits: Vec<SearchHit>) -> Self {
        let mut results = Self::default();
        for hit in hits {
            results.metadata.push(ChunkMetadata::from_map(&hit.metadata));
            results.documents.push(hit.document);
            results.distances.push(hit.distance);
        }
        results
    }

    /// 에러만 담은 빈 결과
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

// ============================================================================
// CourseIndex
// ============================================================================

/// 이중 인덱스
pub struct CourseIndex {
    store: Arc<dyn VectorStore>,
    max_results: usize,
}

impl CourseIndex {
    /// 저장소와 기본 결과 수로 생성
    pub fn new(store: Arc<dyn VectorStore>, max_results: usize) -> Self {
        Self {
            store,
            max_results: max_results.max(1),
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// 카탈로그 레코드 추가
    pub async fn add_course_metadata(&self, course: &CourseDocument) -> Result<()> {
        let lessons_json = serde_json::to_string(&course.lesson_summaries())
            .map_err(RagError::index)?;

        let metadata = json!({
            "title": course.title,
            "instructor": course.instructor,
            "course_link": course.link,
            "lesson_count": course.lessons.len(),
            "lessons_json": lessons_json,
        });

        let record = Record {
            id: course.title.clone(),
            document: course.title.clone(),
            metadata: into_map(metadata),
        };

        self.store
            .upsert(Collection::CourseCatalog, &[record])
            .await
            .map_err(RagError::index)?;

        tracing::debug!("Added catalog record: {}", course.title);
        Ok(())
    }

    /// 콘텐츠 레코드 추가
    pub async fn add_course_content(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let records: Vec<Record> = chunks
            .iter()
            .map(|chunk| Record {
                id: chunk.record_id(),
                document: chunk.content.clone(),
                metadata: into_map(json!({
                    FIELD_COURSE_TITLE: chunk.course_title,
                    FIELD_LESSON_NUMBER: chunk.lesson_number,
                    "chunk_index": chunk.chunk_index,
                })),
            })
            .collect();

        self.store
            .upsert(Collection::CourseContent, &records)
            .await
            .map_err(RagError::index)
    }

    /// 콘텐츠 + 카탈로그 추가 (중복 확인은 호출자 책임)
    ///
    /// 카탈로그 레코드는 콘텐츠 저장이 끝난 뒤 마지막에 기록됩니다.
    /// 콘텐츠 저장이 실패하면 제목이 등록되지 않아 다음 수집에서 재시도됩니다.
    pub async fn add_course(&self, course: &CourseDocument, chunks: &[Chunk]) -> Result<usize> {
        let added = self.add_course_content(chunks).await?;
        self.add_course_metadata(course).await?;
        tracing::info!("Indexed course '{}' ({} chunks)", course.title, added);
        Ok(added)
    }

    /// 인덱싱된 강의 제목 목록
    pub async fn existing_titles(&self) -> Result<BTreeSet<String>> {
        let ids = self
            .store
            .ids(Collection::CourseCatalog)
            .await
            .map_err(RagError::index)?;
        Ok(ids.into_iter().collect())
    }

    pub async fn course_count(&self) -> Result<usize> {
        self.store
            .count(Collection::CourseCatalog)
            .await
            .map_err(RagError::index)
    }

    pub async fn content_count(&self) -> Result<usize> {
        self.store
            .count(Collection::CourseContent)
            .await
            .map_err(RagError::index)
    }

    /// 강의명 해석 (카탈로그 최근접 1개)
    pub async fn resolve_course_name(&self, course_name: &str) -> Result<Option<String>> {
        let hits = self
            .store
            .query(Collection::CourseCatalog, course_name, None, 1)
            .await
            .map_err(RagError::index)?;

        Ok(hits.into_iter().next().map(|hit| {
            hit.metadata
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(hit.id)
        }))
    }

    /// 콘텐츠 검색
    ///
    /// # Arguments
    /// * `query` - 검색 질의
    /// * `course_name` - 강의명 (부분/퍼지 일치)
    /// * `lesson_number` - 레슨 번호 필터
    /// * `limit` - 결과 수 (기본: `max_results`)
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<usize>,
    ) -> SearchResults {
        let course_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await {
                Ok(Some(title)) => Some(title),
                Ok(None) => {
                    return SearchResults::from_error(format!(
                        "No course found matching '{}'",
                        name
                    ))
                }
                Err(e) => {
                    tracing::error!("Course resolution failed: {}", e);
                    return SearchResults::from_error(format!("Search error: {}", e));
                }
            },
            None => None,
        };

        let filter = build_filter(course_title.as_deref(), lesson_number);
        let limit = limit.unwrap_or(self.max_results);

        tracing::debug!(
            "Searching content: query={:?}, filter={:?}, limit={}",
            query,
            filter,
            limit
        );

        match self
            .store
            .query(Collection::CourseContent, query, filter.as_ref(), limit)
            .await
        {
            Ok(hits) => SearchResults::from_hits(hits),
            Err(e) => {
                tracing::error!("Content search failed: {:#}", e);
                SearchResults::from_error(format!("Search error: {}", e))
            }
        }
    }

    /// 레슨 링크 조회
    pub async fn get_lesson_link(&self, course_title: &str, lesson_number: u32) -> Option<String> {
        let outline = self.get_course_outline(course_title).await?;
        outline
            .lessons
            .into_iter()
            .find(|l| l.lesson_number == lesson_number)
            .and_then(|l| l.lesson_link)
    }

    /// 강의 링크 조회
    pub async fn get_course_link(&self, course_title: &str) -> Option<String> {
        self.get_course_outline(course_title).await?.link
    }

    /// 카탈로그 레코드에서 강의 개요 복원
    pub async fn get_course_outline(&self, course_title: &str) -> Option<CourseOutline> {
        match self.store.get(Collection::CourseCatalog, course_title).await {
            Ok(record) => record.map(|r| outline_from_record(&r)),
            Err(e) => {
                tracing::warn!("Failed to load course '{}': {:#}", course_title, e);
                None
            }
        }
    }

    /// 전체 강의 개요 (제목순)
    pub async fn get_all_courses_metadata(&self) -> Result<Vec<CourseOutline>> {
        let mut outlines = Vec::new();
        for title in self.existing_titles().await? {
            let record = self
                .store
                .get(Collection::CourseCatalog, &title)
                .await
                .map_err(RagError::index)?;
            if let Some(record) = record {
                outlines.push(outline_from_record(&record));
            }
        }
        Ok(outlines)
    }

    /// 두 컬렉션 모두 비우기
    pub async fn clear_all(&self) -> Result<()> {
        for collection in [Collection::CourseCatalog, Collection::CourseContent] {
            self.store.clear(collection).await.map_err(RagError::index)?;
        }
        tracing::info!("Cleared course index");
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 강의/레슨 필터 구성 (둘 다 있으면 AND)
fn build_filter(course_title: Option<&str>, lesson_number: Option<u32>) -> Option<MetadataFilter> {
    match (course_title, lesson_number) {
        (Some(title), Some(lesson)) => Some(MetadataFilter::And(vec![
            MetadataFilter::eq(FIELD_COURSE_TITLE, title),
            MetadataFilter::eq(FIELD_LESSON_NUMBER, lesson),
        ])),
        (Some(title), None) => Some(MetadataFilter::eq(FIELD_COURSE_TITLE, title)),
        (None, Some(lesson)) => Some(MetadataFilter::eq(FIELD_LESSON_NUMBER, lesson)),
        (None, None) => None,
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn outline_from_record(record: &Record) -> CourseOutline {
    let text = |key: &str| {
        record
            .metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let lessons: Vec<LessonSummary> = text("lessons_json")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    CourseOutline {
        title: text("title").unwrap_or_else(|| record.id.clone()),
        link: text("course_link"),
        instructor: text("instructor"),
        lessons,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::MemoryVectorStore;
    use crate::models::Lesson;

    fn index() -> CourseIndex {
        let store = MemoryVectorStore::new(Arc::new(HashEmbedding::default()));
        CourseIndex::new(Arc::new(store), DEFAULT_MAX_RESULTS)
    }

    fn course(title: &str, lessons: &[(u32, &str)]) -> CourseDocument {
        CourseDocument {
            title: title.to_string(),
            link: Some(format!("https://example.com/{}", title.replace(' ', "-"))),
            instructor: Some("Ada".to_string()),
            lessons: lessons
                .iter()
                .map(|(n, body)| Lesson {
                    number: *n,
                    title: format!("Lesson title {}", n),
                    link: Some(format!("https://example.com/lesson/{}", n)),
                    raw_text: body.to_string(),
                })
                .collect(),
        }
    }

    fn chunk(title: &str, lesson: u32, index: u32, body: &str) -> Chunk {
        Chunk {
            content: format!("{}{}", Chunk::header(title, lesson), body),
            course_title: title.to_string(),
            lesson_number: lesson,
            chunk_index: index,
        }
    }

    async fn seeded() -> CourseIndex {
        let index = index();
        let mcp = course("Introduction to MCP", &[(1, "servers"), (2, "clients")]);
        index
            .add_course(
                &mcp,
                &[
                    chunk("Introduction to MCP", 1, 0, "MCP servers expose tools."),
                    chunk("Introduction to MCP", 2, 0, "MCP clients call tools."),
                ],
            )
            .await
            .unwrap();

        let caching = course("Prompt Caching Fundamentals", &[(2, "cache")]);
        index
            .add_course(
                &caching,
                &[chunk("Prompt Caching Fundamentals", 2, 0, "Caching tools saves tokens.")],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_unknown_course_on_empty_catalog() {
        let index = index();
        let results = index
            .search("nonexistent course", Some("XYZ123"), None, None)
            .await;

        assert!(results.is_empty());
        assert_eq!(
            results.error.as_deref(),
            Some("No course found matching 'XYZ123'")
        );
    }

    #[tokio::test]
    async fn test_search_with_course_and_lesson_filter() {
        let index = seeded().await;
        let results = index.search("tools", Some("MCP"), Some(2), None).await;

        assert!(results.error.is_none());
        assert_eq!(results.len(), 1);
        assert_eq!(results.metadata[0].course_title, "Introduction to MCP");
        assert_eq!(results.metadata[0].lesson_number, Some(2));
        assert_eq!(results.metadata[0].chunk_index, Some(0));
    }

    #[tokio::test]
    async fn test_search_lesson_only_spans_courses() {
        let index = seeded().await;
        let results = index.search("tools", None, Some(2), Some(10)).await;

        assert_eq!(results.len(), 2);
        assert!(results.metadata.iter().all(|m| m.lesson_number == Some(2)));
        assert_eq!(results.distances.len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_lookups() {
        let index = seeded().await;

        assert_eq!(index.course_count().await.unwrap(), 2);
        assert_eq!(index.content_count().await.unwrap(), 3);
        assert!(index
            .existing_titles()
            .await
            .unwrap()
            .contains("Prompt Caching Fundamentals"));

        assert_eq!(
            index.get_lesson_link("Introduction to MCP", 2).await.as_deref(),
            Some("https://example.com/lesson/2")
        );
        assert_eq!(
            index.get_course_link("Introduction to MCP").await.as_deref(),
            Some("https://example.com/Introduction-to-MCP")
        );
        assert!(index.get_lesson_link("Introduction to MCP", 9).await.is_none());

        let outline = index.get_course_outline("Introduction to MCP").await.unwrap();
        assert_eq!(outline.instructor.as_deref(), Some("Ada"));
        assert_eq!(outline.lessons.len(), 2);

        let all = index.get_all_courses_metadata().await.unwrap();
        assert_eq!(all[0].title, "Introduction to MCP");
    }

    #[tokio::test]
    async fn test_clear_all() {
        let index = seeded().await;
        index.clear_all().await.unwrap();

        assert_eq!(index.course_count().await.unwrap(), 0);
        assert!(index.search("tools", None, None, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_similar_titles_keep_separate_chunks() {
        let index = index();
        for title in ["A B", "A_B"] {
            index
                .add_course(
                    &course(title, &[(1, "body")]),
                    &[chunk(title, 1, 0, "Shared lesson text.")],
                )
                .await
                .unwrap();
        }

        assert_eq!(index.content_count().await.unwrap(), 2);
        let results = index.search("lesson", None, Some(1), Some(10)).await;
        let mut titles: Vec<&str> = results
            .metadata
            .iter()
            .map(|m| m.course_title.as_str())
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["A B", "A_B"]);
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(None, None).is_none());
        assert_eq!(
            build_filter(Some("A"), None),
            Some(MetadataFilter::eq(FIELD_COURSE_TITLE, "A"))
        );
        assert!(matches!(
            build_filter(Some("A"), Some(1)),
            Some(MetadataFilter::And(ref f)) if f.len() == 2
        ));
    }
}
