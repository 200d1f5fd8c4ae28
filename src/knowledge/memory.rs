//! In-memory Vector Store
//!
//! 컬렉션별 `Vec` 을 `tokio::sync::RwLock` 뒤에 둡니다.
//! 검색은 전체 벡터에 대한 코사인 유사도 브루트포스입니다.
//! 테스트와 `COURSE_RAG_STORE=memory` 실행에 사용합니다.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::EmbeddingProvider;

use super::vector::{
    cosine_similarity, Collection, MetadataFilter, Record, SearchHit, VectorStore,
};

struct StoredRecord {
    record: Record,
    embedding: Vec<f32>,
}

/// 메모리 벡터 저장소
pub struct MemoryVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    collections: RwLock<HashMap<Collection, Vec<StoredRecord>>>,
}

impl MemoryVectorStore {
    /// 임베딩 프로바이더로 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // 락 밖에서 임베딩
        let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection).or_default();

        for (record, embedding) in records.iter().zip(embeddings) {
            let entry = StoredRecord {
                record: record.clone(),
                embedding,
            };
            match stored.iter_mut().find(|s| s.record.id == record.id) {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }

        Ok(records.len())
    }

    async fn query(
        &self,
        collection: Collection,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed_query(text).await?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(&collection) else {
            return Ok(vec![]);
        };

        let mut hits: Vec<SearchHit> = stored
            .iter()
            .filter(|s| filter.map_or(true, |f| f.matches(&s.record.metadata)))
            .map(|s| SearchHit {
                id: s.record.id.clone(),
                document: s.record.document.clone(),
                metadata: s.record.metadata.clone(),
                distance: 1.0 - cosine_similarity(&query_embedding, &s.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        Ok(hits)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|stored| stored.iter().find(|s| s.record.id == id))
            .map(|s| s.record.clone()))
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|stored| stored.iter().map(|s| s.record.id.clone()).collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).map_or(0, Vec::len))
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        self.collections.write().await.remove(&collection);
        Ok(())
    }
}
