//! Google Gemini 임베딩
//!
//! ref: https://ai.google.dev/gemini-api/docs/embeddings

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{get_api_key, EmbeddingProvider};

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 무료 티어: 60 RPM
const RATE_LIMIT_RPM: usize = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY: Duration = Duration::from_millis(1000);
/// 429/전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 임베딩 용도
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// 슬라이딩 윈도우 레이트 리미터
#[derive(Debug, Default)]
struct RateLimiter {
    window: VecDeque<Instant>,
}

impl RateLimiter {
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.window.front() {
            if now.duration_since(front) < RATE_LIMIT_WINDOW {
                break;
            }
            self.window.pop_front();
        }
    }

    /// 다음 요청까지 기다려야 하는 시간
    fn delay(&mut self, now: Instant) -> Duration {
        self.prune(now);

        let spacing = self
            .window
            .back()
            .map(|last| MIN_DELAY.saturating_sub(now.duration_since(*last)))
            .unwrap_or_default();

        let window_wait = if self.window.len() >= RATE_LIMIT_RPM {
            self.window
                .front()
                .map(|oldest| RATE_LIMIT_WINDOW.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        spacing.max(window_wait)
    }

    /// 요청 가능할 때까지 대기 후 기록
    async fn acquire(&mut self) {
        let wait = self.delay(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Embedding rate limit, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        let now = Instant::now();
        self.prune(now);
        self.window.push_back(now);
    }
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiEmbedding {
    /// 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    /// 기본 차원으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
    }

    async fn request(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.as_str(),
            output_dimensionality: self.dimension,
        };

        let mut attempt = 0;
        loop {
            self.rate_limiter.lock().await.acquire().await;

            // API 키는 URL이 아닌 헤더로 전송
            let sent = self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await;

            let failure = match sent {
                Err(e) => anyhow::anyhow!("Failed to send embedding request: {}", e),
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .context("Failed to read response body")?;

                    if status.is_success() {
                        let parsed: EmbedResponse = serde_json::from_str(&body)
                            .context("Failed to parse embedding response")?;
                        return Ok(parsed.embedding.values);
                    }
                    if status.as_u16() != 429 {
                        return Err(api_error(status, &body));
                    }
                    anyhow::anyhow!("Rate limit exceeded (429)")
                }
            };

            if attempt >= MAX_RETRIES {
                return Err(failure.context(format!(
                    "Embedding failed after {} retries",
                    MAX_RETRIES
                )));
            }

            let backoff = Self::backoff(attempt);
            attempt += 1;
            tracing::warn!(
                "{}; retrying in {:?} (attempt {}/{})",
                failure,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => anyhow::anyhow!(
            "Gemini API error ({}): {}",
            error.error.status,
            error.error.message
        ),
        Err(_) => anyhow::anyhow!("Gemini API error ({}): {}", status, body),
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text, TaskType::Query).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 배치 API 없음 - 레이트 리미터가 간격 조절
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim).unwrap();
            assert_eq!(embedder.dimension(), dim);
        }
    }

    #[tokio::test]
    async fn test_empty_text_returns_zero_vector() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rate_limiter_spacing_and_window() {
        let mut limiter = RateLimiter::default();
        let start = Instant::now();
        assert_eq!(limiter.delay(start), Duration::ZERO);

        limiter.window.push_back(start);
        assert!(limiter.delay(start) > Duration::ZERO);
        assert_eq!(limiter.delay(start + MIN_DELAY), Duration::ZERO);

        // 윈도우 가득 참
        for _ in 1..RATE_LIMIT_RPM {
            limiter.window.push_back(start);
        }
        let later = start + Duration::from_secs(10);
        assert_eq!(limiter.delay(later), Duration::from_secs(50));
        assert_eq!(limiter.delay(start + RATE_LIMIT_WINDOW), Duration::ZERO);
        assert!(limiter.window.is_empty());
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(err.to_string(), "Gemini API error (INVALID_ARGUMENT): API key not valid");

        let err = api_error(reqwest::StatusCode::BAD_GATEWAY, "oops");
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(GeminiEmbedding::backoff(0), Duration::from_millis(2000));
        assert_eq!(GeminiEmbedding::backoff(2), Duration::from_millis(8000));
    }
}
