//! 리랭크 모듈 - 질의와 후보 문서의 관련도 재정렬
//!
//! source: https://docs.cohere.com/reference/rerank
//!
//! 리랭커는 원본 후보 목록의 인덱스를 돌려줍니다. 이 인덱스가
//! 후보 텍스트로 되돌아가는 유일한 연결 고리입니다.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cohere::CohereClient;

// ============================================================================
// Types
// ============================================================================

/// 리랭크 결과 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct RerankHit {
    /// 원본 후보 목록에서의 인덱스 (0-based)
    pub index: usize,
    /// 리랭크 순위 (0 = 가장 관련 높음)
    pub rank: usize,
    /// 관련도 점수
    pub relevance_score: f32,
}

// ============================================================================
// Reranker Trait
// ============================================================================

/// 리랭커 트레이트
#[async_trait]
pub trait Reranker: Send + Sync {
    /// 관련도 순으로 상위 `top_n`개 결과 반환 (rank 0 먼저)
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize)
        -> Result<Vec<RerankHit>>;

    /// 리랭커 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Cohere Reranker
// ============================================================================

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

#[derive(Debug, Deserialize)]
struct RerankResultItem {
    index: usize,
    relevance_score: f32,
}

/// Cohere 리랭커 구현체
#[derive(Debug, Clone)]
pub struct CohereReranker {
    client: CohereClient,
    model: String,
}

impl CohereReranker {
    pub fn new(client: CohereClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };

        let response: RerankResponse = self
            .client
            .post("/v1/rerank", &request)
            .await
            .context("Failed to rerank documents")?;

        Ok(into_hits(response))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// API 응답 순서를 순위로 사용
fn into_hits(response: RerankResponse) -> Vec<RerankHit> {
    response
        .results
        .into_iter()
        .enumerate()
        .map(|(rank, item)| RerankHit {
            index: item.index,
            rank,
            relevance_score: item.relevance_score,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
