//! 임베딩 모듈 - Cohere API를 통한 텍스트 벡터화
//!
//! source: https://docs.cohere.com/reference/embed
//!
//! 인덱싱 시에는 `EmbedMode::Document`, 질의 시에는 `EmbedMode::Query`로
//! 호출합니다. 두 모드는 같은 벡터 공간을 공유합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = CohereEmbedding::new(client, "embed-english-v3.0", 1024);
//! let vector = embedder.embed_query("What is RAG?").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cohere::CohereClient;

/// Cohere embed API 한 번에 보낼 수 있는 최대 텍스트 수
const MAX_TEXTS_PER_CALL: usize = 96;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 호출 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// 인덱싱할 문서
    Document,
    /// 검색 질의
    Query,
}

impl EmbedMode {
    /// Cohere `input_type` 값
    pub fn input_type(self) -> &'static str {
        match self {
            Self::Document => "search_document",
            Self::Query => "search_query",
        }
    }
}

/// 임베딩 프로바이더 트레이트
///
/// 텍스트 목록을 같은 길이의 벡터 목록으로 변환합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 텍스트 목록 임베딩 (입력 하나당 벡터 하나)
    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>>;

    /// 단일 질의 임베딩
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()], EmbedMode::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector for the query"))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Cohere Embedding
// ============================================================================

/// Cohere embed 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'static str,
}

/// Cohere embed 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Cohere 임베딩 구현체
#[derive(Debug, Clone)]
pub struct CohereEmbedding {
    client: CohereClient,
    model: String,
    dimension: usize,
}

impl CohereEmbedding {
    /// # Arguments
    /// * `client` - 공유 Cohere 클라이언트
    /// * `model` - 임베딩 모델 (예: embed-english-v3.0)
    /// * `dimension` - 모델 출력 차원
    pub fn new(client: CohereClient, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }

    async fn embed_chunk(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            texts,
            input_type: mode.input_type(),
        };

        let response: EmbedResponse = self.client.post("/v1/embed", &request).await?;
        check_embeddings(response.embeddings, texts.len(), self.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedding {
    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(MAX_TEXTS_PER_CALL).enumerate() {
            if texts.len() > MAX_TEXTS_PER_CALL {
                tracing::debug!(
                    "Embedding batch {}/{}",
                    i + 1,
                    texts.len().div_ceil(MAX_TEXTS_PER_CALL)
                );
            }
            let embedded = self
                .embed_chunk(batch, mode)
                .await
                .with_context(|| format!("Failed to embed {} texts", batch.len()))?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 응답 벡터 수와 차원 확인
fn check_embeddings(
    embeddings: Vec<Vec<f32>>,
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected_count {
        anyhow::bail!(
            "Embedding count mismatch: sent {} texts, received {} vectors",
            expected_count,
            embeddings.len()
        );
    }

    if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, received {}",
            dimension,
            bad.len()
        );
    }

    Ok(embeddings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_type() {
        assert_eq!(EmbedMode::Document.input_type(), "search_document");
        assert_eq!(EmbedMode::Query.input_type(), "search_query");
    }

    #[test]
    fn test_request_body() {
        let texts = vec!["hello".to_string()];
        let request = EmbedRequest {
            model: "embed-english-v3.0",
            texts: &texts,
            input_type: EmbedMode::Query.input_type(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "embed-english-v3.0");
        assert_eq!(json["texts"][0], "hello");
        assert_eq!(json["input_type"], "search_query");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"id": "abc", "embeddings": [[0.1, 0.2], [0.3, 0.4]], "texts": ["a", "b"]}"#;
        let response: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1], vec![0.3, 0.4]);
    }

    #[test]
    fn test_check_embeddings_count_mismatch() {
        let result = check_embeddings(vec![vec![0.0; 2]], 2, 2);
        assert!(result
            .err()
            .map(|e| e.to_string().contains("count mismatch"))
            .unwrap_or(false));
    }

    #[test]
    fn test_check_embeddings_dimension_mismatch() {
        let result = check_embeddings(vec![vec![0.0; 3]], 1, 2);
        assert!(result.is_err());

        let ok = check_embeddings(vec![vec![0.0; 2], vec![1.0; 2]], 2, 2);
        assert!(ok.is_ok());
    }
}
