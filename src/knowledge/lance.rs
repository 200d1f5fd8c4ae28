//! LanceDB Vector Store - 디스크 기반 벡터 검색
//!
//! 컬렉션마다 테이블 하나 (`course_catalog`, `course_content`).
//! 필터 가능한 메타데이터(`course_title`, `lesson_number`)는 별도 컬럼으로,
//! 전체 메타데이터는 JSON 문자열 컬럼으로 저장합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use serde_json::{Map, Value};

use crate::embedding::EmbeddingProvider;

use super::vector::{
    Collection, MetadataFilter, Record, SearchHit, VectorStore, FIELD_COURSE_TITLE,
    FIELD_LESSON_NUMBER,
};

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 같은 ID의 레코드는 삭제 후 추가하여 upsert 합니다.
pub struct LanceVectorStore {
    db: Connection,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `embedder` - 레코드/질의 임베딩 프로바이더
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, embedder })
    }

    fn dimension(&self) -> i32 {
        self.embedder.dimension() as i32
    }

    /// 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document", DataType::Utf8, false),
            Field::new(FIELD_COURSE_TITLE, DataType::Utf8, true),
            Field::new(FIELD_LESSON_NUMBER, DataType::Int64, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(
        records: &[Record],
        embeddings: &[Vec<f32>],
        dimension: i32,
    ) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension as usize) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                dimension,
                bad.len()
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let documents: Vec<&str> = records.iter().map(|r| r.document.as_str()).collect();
        let course_titles: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.metadata.get(FIELD_COURSE_TITLE).and_then(Value::as_str))
            .collect();
        let lesson_numbers: Vec<Option<i64>> = records
            .iter()
            .map(|r| r.metadata.get(FIELD_LESSON_NUMBER).and_then(Value::as_i64))
            .collect();
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to encode metadata")?;

        let values = Float32Array::from(embeddings.concat());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(documents)),
                Arc::new(StringArray::from(course_titles)),
                Arc::new(Int64Array::from(lesson_numbers)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// RecordBatch 에서 레코드 추출 (`_distance` 컬럼이 있으면 함께)
    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
        let ids = string_column(batch, "id")?;
        let documents = string_column(batch, "document")?;
        let metadata = string_column(batch, "metadata")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let meta: Map<String, Value> = serde_json::from_str(metadata.value(i))
                .context("Failed to decode metadata")?;
            hits.push(SearchHit {
                id: ids.value(i).to_string(),
                document: documents.value(i).to_string(),
                metadata: meta,
                distance: distances.map_or(0.0, |d| d.value(i)),
            });
        }

        Ok(hits)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self, collection: Collection) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == collection.table_name()))
            .unwrap_or(false)
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self, collection: Collection) -> Result<Option<Table>> {
        if !self.table_exists(collection).await {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(collection.table_name())
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", collection))?;
        Ok(Some(table))
    }

    fn collect_hits(batches: &[RecordBatch]) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for batch in batches {
            hits.extend(Self::batch_to_hits(batch)?);
        }
        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed records")?;

        let batch = Self::records_to_batch(records, &embeddings, self.dimension())?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table(collection).await? {
            Some(table) => {
                // 같은 ID 먼저 삭제 (last-write-wins)
                let id_list = records
                    .iter()
                    .map(|r| sql_string(&r.id))
                    .collect::<Vec<_>>()
                    .join(", ");
                table
                    .delete(&format!("id IN ({})", id_list))
                    .await
                    .context("Failed to delete previous records")?;

                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add records to table")?;
            }
            None => {
                self.db
                    .create_table(collection.table_name(), batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        tracing::debug!("Upserted {} records into {}", records.len(), collection);
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: Collection,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(vec![]);
        };

        let query_embedding = self
            .embedder
            .embed_query(text)
            .await
            .context("Failed to embed query")?;

        let mut query = table
            .vector_search(query_embedding)
            .context("Failed to create vector search")?
            .limit(limit);

        if let Some(filter) = filter {
            query = query.only_if(filter_to_sql(filter)?);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        Self::collect_hits(&batches)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(None);
        };

        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("id = {}", sql_string(id)))
            .limit(1)
            .execute()
            .await
            .context("Failed to query record by id")?
            .try_collect()
            .await?;

        let hit = Self::collect_hits(&batches)?.into_iter().next();
        Ok(hit.map(|h| Record {
            id: h.id,
            document: h.document,
            metadata: h.metadata,
        }))
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(vec![]);
        };

        let total = table.count_rows(None).await.context("Failed to count rows")?;
        let batches: Vec<RecordBatch> = table
            .query()
            .limit(total.max(1))
            .execute()
            .await
            .context("Failed to list ids")?
            .try_collect()
            .await?;
        let mut ids = Vec::new();
        for batch in &batches {
            let column = string_column(batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|i| column.value(i).to_string()));
        }
        Ok(ids)
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(0);
        };

        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        if self.table_exists(collection).await {
            self.db
                .drop_table(collection.table_name())
                .await
                .with_context(|| format!("Failed to drop table {}", collection))?;
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// SQL 문자열 리터럴 (작은따옴표 이스케이프)
fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// 메타데이터 필터를 SQL 조건으로 변환
///
/// 컬럼으로 저장된 필드만 허용합니다.
fn filter_to_sql(filter: &MetadataFilter) -> Result<String> {
    match filter {
        MetadataFilter::Eq { field, value } => {
            let literal = match (field.as_str(), value) {
                (FIELD_COURSE_TITLE, Value::String(s)) => sql_string(s),
                (FIELD_LESSON_NUMBER, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                    n.to_string()
                }
                _ => anyhow::bail!("Unsupported filter: {} = {}", field, value),
            };
            Ok(format!("{} = {}", field, literal))
        }
        MetadataFilter::And(filters) => {
            if filters.is_empty() {
                anyhow::bail!("Empty AND filter");
            }
            let parts = filters
                .iter()
                .map(filter_to_sql)
                .collect::<Result<Vec<_>>>()?;
            Ok(parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(" AND "))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
