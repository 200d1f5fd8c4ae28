//! 해시 임베딩 - API 키 없이 동작하는 로컬 임베딩
//!
//! 단어와 문자 3-gram을 SHA-256으로 버킷에 해싱한 뒤 L2 정규화합니다.
//! 의미 임베딩은 아니지만 어휘가 겹치는 텍스트끼리 가깝게 배치되어
//! 오프라인 실행과 테스트에 사용합니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 기본 차원 (all-MiniLM-L6-v2와 동일)
const DEFAULT_HASH_DIMENSION: usize = 384;
/// 3-gram 가중치 (단어 가중치 1.0 대비)
const TRIGRAM_WEIGHT: f32 = 0.5;

/// 로컬 해시 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl HashEmbedding {
    /// 차원 지정
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// 동기 임베딩
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in tokenize(text) {
            self.add_feature(&mut vector, &word, 1.0);

            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            for window in chars.windows(3) {
                let gram: String = window.iter().collect();
                self.add_feature(&mut vector, &gram, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        // 부호 해싱으로 충돌 편향 완화
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// 소문자 영숫자 토큰
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}
