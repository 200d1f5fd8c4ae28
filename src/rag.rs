//! RAG 시스템 - 수집, 검색 도구, 답변 생성, 세션 조립
//!
//! 질의마다 새 `ToolManager`(도구 인스턴스 포함)를 만들어
//! 동시 질의끼리 출처 보관함을 공유하지 않습니다.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::collector::FileCollector;
use crate::config::{Config, StoreBackend};
use crate::document::DocumentProcessor;
use crate::embedding::create_embedder;
use crate::error::Result;
use crate::generator::AiGenerator;
use crate::knowledge::{CourseIndex, LanceVectorStore, MemoryVectorStore, VectorStore};
use crate::llm::{CompletionService, OpenAiCompletion};
use crate::models::{CourseDocument, Source};
use crate::session::SessionManager;
use crate::tools::{CourseOutlineTool, CourseSearchTool, ToolManager};

// ============================================================================
// Result Types
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub courses_added: usize,
    pub chunks_added: usize,
}

/// 질의 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

/// 강의 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

// ============================================================================
// RagSystem
// ============================================================================

/// RAG 시스템
pub struct RagSystem {
    processor: DocumentProcessor,
    index: Arc<CourseIndex>,
    generator: AiGenerator,
    sessions: SessionManager,
}

impl RagSystem {
    /// 구성 요소로 조립
    pub fn new(config: &Config, index: Arc<CourseIndex>, service: Arc<dyn CompletionService>) -> Self {
        Self {
            processor: DocumentProcessor::with_sizes(config.chunk_size, config.chunk_overlap),
            index,
            generator: AiGenerator::new(service),
            sessions: SessionManager::new(config.max_history),
        }
    }

    /// 설정에 따라 임베딩/저장소/완성 서비스를 생성하여 조립
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let index = Arc::new(open_index(config).await?);
        let service = Arc::new(OpenAiCompletion::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
        )?);

        tracing::info!("Using completion model {}", config.openai_model);
        Ok(Self::new(config, index, service))
    }

    pub fn index(&self) -> &Arc<CourseIndex> {
        &self.index
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn generator(&self) -> &AiGenerator {
        &self.generator
    }

    /// 질의 전용 도구 매니저
    pub fn tool_manager(&self) -> Result<ToolManager> {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(CourseSearchTool::new(self.index.clone())))?;
        manager.register(Arc::new(CourseOutlineTool::new(self.index.clone())))?;
        Ok(manager)
    }

    /// 강의 문서 1개 추가 (이미 있는 제목이면 None)
    pub async fn add_course_document(
        &self,
        path: &Path,
    ) -> Result<Option<(CourseDocument, usize)>> {
        let (course, chunks) = self.processor.process_course_document(path).await?;

        if self.index.existing_titles().await?.contains(&course.title) {
            tracing::info!("Course already indexed: {}", course.title);
            return Ok(None);
        }

        let added = self.index.add_course(&course, &chunks).await?;
        Ok(Some((course, added)))
    }

    /// 폴더의 강의 문서 일괄 추가
    ///
    /// 이미 있는 제목은 건너뛰며, 파일별 실패는 로그만 남깁니다.
    pub async fn add_course_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> anyhow::Result<IngestStats> {
        let mut stats = IngestStats::default();

        if !folder.exists() {
            tracing::warn!("Folder {:?} does not exist", folder);
            return Ok(stats);
        }

        if clear_existing {
            tracing::info!("Clearing existing data for fresh rebuild");
            self.index.clear_all().await?;
        }

        let files = FileCollector::with_defaults()
            .collect_directory(folder)
            .with_context(|| format!("Failed to collect files from {:?}", folder))?;

        let mut existing: BTreeSet<String> = self.index.existing_titles().await?;

        for file in files {
            let (course, chunks) = match self.processor.process_course_document(&file.path).await {
                Ok(processed) => processed,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", file.path, e);
                    continue;
                }
            };

            if existing.contains(&course.title) {
                tracing::info!("Course already exists: {} - skipping", course.title);
                continue;
            }

            let added = match self.index.add_course(&course, &chunks).await {
                Ok(added) => added,
                Err(e) => {
                    tracing::warn!("Failed to index course '{}': {}", course.title, e);
                    continue;
                }
            };

            stats.courses_added += 1;
            stats.chunks_added += added;
            existing.insert(course.title);
        }

        tracing::info!(
            "Ingested {} courses ({} chunks) from {:?}",
            stats.courses_added,
            stats.chunks_added,
            folder
        );
        Ok(stats)
    }

    /// 질의 처리
    ///
    /// 세션 ID가 없으면 새 세션을 만듭니다.
    /// 출처는 생성 직후 한 번 읽고 실패 여부와 관계없이 초기화합니다.
    pub async fn query(&self, query: &str, session_id: Option<&str>) -> Result<Answer> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create_session(),
        };

        let history = self.sessions.get_conversation_history(&session_id);
        let tools = self.tool_manager()?;
        let prompt = format!("Answer this question about course materials: {}", query);

        let result = self
            .generator
            .generate_response(&prompt, history.as_deref(), Some(&tools))
            .await;

        let sources = tools.last_sources();
        tools.reset_sources();

        let answer = result?;
        self.sessions.add_exchange(&session_id, query, &answer);

        Ok(Answer {
            answer,
            sources,
            session_id,
        })
    }

    /// 강의 통계
    pub async fn course_analytics(&self) -> Result<CourseAnalytics> {
        let titles = self.index.existing_titles().await?;
        Ok(CourseAnalytics {
            total_courses: titles.len(),
            course_titles: titles.into_iter().collect(),
        })
    }
}

/// 설정에 맞는 저장소로 인덱스 생성
pub async fn open_index(config: &Config) -> anyhow::Result<CourseIndex> {
    let embedder = create_embedder(config.embedding)?;

    let store: Arc<dyn VectorStore> = match config.store {
        StoreBackend::Lance => {
            let path = config.lance_path();
            tracing::info!("Opening LanceDB at {:?}", path);
            Arc::new(LanceVectorStore::open(&path, embedder).await?)
        }
        StoreBackend::Memory => Arc::new(MemoryVectorStore::new(embedder)),
    };

    Ok(CourseIndex::new(store, config.max_results))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::error::RagError;
    use crate::knowledge::{Collection, MetadataFilter, Record, SearchHit};
    use crate::llm::scripted::ScriptedCompletion;
    use crate::llm::{Completion, ToolCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const MCP_COURSE: &str = "Course Title: Introduction to MCP
Course Link: https://example.com/mcp
Course Instructor: Elie

Lesson 1: Servers
Lesson Link: https://example.com/mcp/1
MCP servers expose tools and resources. Clients discover them at runtime.

Lesson 2: Clients
MCP clients connect to servers. They forward tool calls from the model.
";

    const CACHING_COURSE: &str = "Course Title: Prompt Caching
Lesson 0: Basics
Caching stores prompt prefixes. Cached reads are cheaper.
";

    fn system(responses: Vec<anyhow::Result<Completion>>) -> (RagSystem, Arc<ScriptedCompletion>) {
        let service = ScriptedCompletion::new(responses);
        let store = MemoryVectorStore::new(Arc::new(HashEmbedding::default()));
        let index = Arc::new(CourseIndex::new(Arc::new(store), 5));
        let rag = RagSystem::new(&Config::default(), index, service.clone());
        (rag, service)
    }

    fn write_docs() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("course1_script.txt"), MCP_COURSE).unwrap();
        std::fs::write(dir.path().join("course2_script.txt"), CACHING_COURSE).unwrap();
        std::fs::write(dir.path().join("broken.txt"), "no header").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_ingest_folder_and_reingest() {
        let (rag, _) = system(vec![]);
        let docs = write_docs();

        let stats = rag.add_course_folder(docs.path(), false).await.unwrap();
        assert_eq!(stats.courses_added, 2);
        assert_eq!(stats.chunks_added, 3);

        let again = rag.add_course_folder(docs.path(), false).await.unwrap();
        assert_eq!(again, IngestStats::default());

        let analytics = rag.course_analytics().await.unwrap();
        assert_eq!(analytics.total_courses, 2);
        assert_eq!(
            analytics.course_titles,
            vec!["Introduction to MCP", "Prompt Caching"]
        );

        let rebuilt = rag.add_course_folder(docs.path(), true).await.unwrap();
        assert_eq!(rebuilt.courses_added, 2);
    }

    #[tokio::test]
    async fn test_missing_folder_adds_nothing() {
        let (rag, _) = system(vec![]);
        let stats = rag
            .add_course_folder(Path::new("/nonexistent/docs"), false)
            .await
            .unwrap();
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn test_add_course_document_skips_known_title() {
        let (rag, _) = system(vec![]);
        let docs = write_docs();
        let path = docs.path().join("course1_script.txt");

        let (course, chunks) = rag.add_course_document(&path).await.unwrap().unwrap();
        assert_eq!(course.title, "Introduction to MCP");
        assert_eq!(chunks, 2);
        assert!(rag.add_course_document(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_with_search_returns_sources() {
        let (rag, service) = system(vec![
            Ok(Completion::tool_calls(vec![ToolCall::new(
                "call_1",
                "search_course_content",
                r#"{"query": "servers", "course_name": "MCP", "lesson_number": 1}"#,
            )])),
            Ok(Completion::text("Servers expose tools.")),
        ]);
        let docs = write_docs();
        rag.add_course_folder(docs.path(), false).await.unwrap();

        let answer = rag.query("What do MCP servers do?", None).await.unwrap();

        assert_eq!(answer.answer, "Servers expose tools.");
        assert_eq!(answer.session_id, "session_1");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].label, "Introduction to MCP - Lesson 1");
        assert_eq!(answer.sources[0].link.as_deref(), Some("https://example.com/mcp/1"));

        let requests = service.requests();
        assert_eq!(requests[0].tools.len(), 2);
        assert_eq!(
            requests[0].messages[1].content.as_deref(),
            Some("Answer this question about course materials: What do MCP servers do?")
        );
        let tool_output = requests[1].messages[3].content.clone().unwrap();
        assert!(tool_output.starts_with("[Introduction to MCP - Lesson 1]"));

        let history = rag.sessions().get_conversation_history("session_1").unwrap();
        assert_eq!(history, "User: What do MCP servers do?\nAssistant: Servers expose tools.");
    }

    #[tokio::test]
    async fn test_direct_answer_has_no_sources_and_uses_history() {
        let (rag, service) = system(vec![
            Ok(Completion::text("First.")),
            Ok(Completion::text("Second.")),
        ]);

        let first = rag.query("hello", Some("s-1")).await.unwrap();
        assert!(first.sources.is_empty());
        assert_eq!(first.session_id, "s-1");

        rag.query("again", Some("s-1")).await.unwrap();
        let system_prompt = service.requests()[1].messages[0].content.clone().unwrap();
        assert!(system_prompt.ends_with("Previous conversation:\nUser: hello\nAssistant: First."));
    }

    #[tokio::test]
    async fn test_completion_failure_propagates_without_history() {
        let (rag, _) = system(vec![Err(anyhow::anyhow!("Incorrect API key provided"))]);

        let err = rag.query("test", Some("s-err")).await.unwrap_err();
        assert!(matches!(err, RagError::CompletionService(_)));
        assert!(err.to_string().contains("API key"));
        assert!(rag.sessions().get_conversation_history("s-err").is_none());
    }

    #[test]
    fn test_tool_manager_has_both_tools() {
        let (rag, _) = system(vec![]);
        let names: Vec<String> = rag
            .tool_manager()
            .unwrap()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["get_course_outline", "search_course_content"]);
    }

    /// 플래그가 켜져 있으면 콘텐츠 upsert가 실패하는 저장소
    struct FailingContentStore {
        inner: MemoryVectorStore,
        fail_content: AtomicBool,
    }

    #[async_trait]
    impl VectorStore for FailingContentStore {
        async fn upsert(
            &self,
            collection: Collection,
            records: &[Record],
        ) -> anyhow::Result<usize> {
            if collection == Collection::CourseContent
                && self.fail_content.load(Ordering::SeqCst)
            {
                anyhow::bail!("disk full");
            }
            self.inner.upsert(collection, records).await
        }

        async fn query(
            &self,
            collection: Collection,
            text: &str,
            filter: Option<&MetadataFilter>,
            limit: usize,
        ) -> anyhow::Result<Vec<SearchHit>> {
            self.inner.query(collection, text, filter, limit).await
        }

        async fn get(
            &self,
            collection: Collection,
            id: &str,
        ) -> anyhow::Result<Option<Record>> {
            self.inner.get(collection, id).await
        }

        async fn ids(&self, collection: Collection) -> anyhow::Result<Vec<String>> {
            self.inner.ids(collection).await
        }

        async fn count(&self, collection: Collection) -> anyhow::Result<usize> {
            self.inner.count(collection).await
        }

        async fn clear(&self, collection: Collection) -> anyhow::Result<()> {
            self.inner.clear(collection).await
        }
    }

    #[tokio::test]
    async fn test_failed_content_write_is_retried_on_next_ingest() {
        let store = Arc::new(FailingContentStore {
            inner: MemoryVectorStore::new(Arc::new(HashEmbedding::default())),
            fail_content: AtomicBool::new(true),
        });
        let index = Arc::new(CourseIndex::new(store.clone(), 5));
        let rag = RagSystem::new(&Config::default(), index, ScriptedCompletion::new(vec![]));
        let docs = write_docs();

        // 강의별 실패는 건너뛰고 폴더 수집은 계속됨
        let stats = rag.add_course_folder(docs.path(), false).await.unwrap();
        assert_eq!(stats, IngestStats::default());
        assert!(rag.index().existing_titles().await.unwrap().is_empty());
        assert_eq!(rag.index().content_count().await.unwrap(), 0);

        store.fail_content.store(false, Ordering::SeqCst);
        let stats = rag.add_course_folder(docs.path(), false).await.unwrap();
        assert_eq!(stats.courses_added, 2);
        assert_eq!(stats.chunks_added, 3);
        assert_eq!(rag.index().content_count().await.unwrap(), 3);
    }
}
