//! Query Pipeline - 임베딩 -> 벡터 검색 -> 리랭크 -> 생성 -> 인용 검증
//!
//! `answer()`는 실패하지 않습니다. 모든 결과(정상 답변, 빈 검색 결과,
//! 프로바이더 에러)는 같은 `AnswerResult` 형태로 돌아옵니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let pipeline = QueryPipeline::from_settings(&settings).await?;
//! let result = pipeline.answer("What does the article say about X?").await;
//! println!("{}", result.answer);
//! ```

mod citation;
mod prompt;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cohere::CohereClient;
use crate::config::Settings;
use crate::embedding::{CohereEmbedding, EmbeddingProvider};
use crate::error::PipelineFailure;
use crate::generation::{AnswerGenerator, CohereChat};
use crate::knowledge::{open_vector_store, VectorStore};
use crate::rerank::{CohereReranker, Reranker};

pub use citation::{
    extract_citation_numbers, fallback_citations, resolve_citations, CitationReference,
};
pub use prompt::{build_context, build_prompt, FALLBACK_PHRASE};

/// 벡터 검색 결과가 없을 때의 답변
pub const NO_DOCUMENTS_ANSWER: &str =
    "I don't know. No relevant documents were found for this query.";

/// 리랭크 결과가 없을 때의 답변
pub const NO_RERANK_ANSWER: &str = "I don't know. The reranker could not find relevant documents.";

// ============================================================================
// Types
// ============================================================================

/// 파이프라인 파라미터
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// 벡터 검색 후보 수
    pub retrieve_k: usize,
    /// 리랭크 후 남길 문서 수
    pub rerank_top_n: usize,
    pub temperature: f32,
    /// 유효 인용이 없을 때 대신 보여줄 최대 문서 수
    pub fallback_citations: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retrieve_k: 50,
            rerank_top_n: 5,
            temperature: 0.3,
            fallback_citations: 2,
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            retrieve_k: settings.retrieve_k,
            rerank_top_n: settings.rerank_top_n,
            temperature: settings.temperature,
            fallback_citations: settings.fallback_citations,
        }
    }
}

/// 리랭크된 문서
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedDocument {
    pub rank: usize,
    /// 원본 후보 목록 인덱스
    pub original_index: usize,
    pub text: String,
}

/// 답변이 만들어진 경로
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// 모델이 유효한 인용을 남김
    Grounded,
    /// 유효한 인용이 없어 상위 문서로 대체
    FallbackCitations,
    /// 벡터 검색에서 텍스트가 있는 후보 없음
    NoCandidates,
    /// 리랭커 결과 없음
    NoRerankResults,
    /// 실패 메시지
    Failed,
}

/// 파이프라인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<CitationReference>,
    pub kind: AnswerKind,
}

impl AnswerResult {
    fn without_citations(answer: impl Into<String>, kind: AnswerKind) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
            kind,
        }
    }

    fn failed(failure: &PipelineFailure) -> Self {
        Self::without_citations(failure.user_message(), AnswerKind::Failed)
    }
}

// ============================================================================
// QueryPipeline
// ============================================================================

/// 질의 파이프라인
///
/// 프로바이더 핸들은 생성 시 한 번 만들어지고 모든 질의에서 재사용됩니다.
pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn AnswerGenerator>,
    options: PipelineOptions,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn AnswerGenerator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            generator,
            options,
        }
    }

    /// 설정으로 Cohere 프로바이더와 벡터 저장소를 연결
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let cohere = CohereClient::new(settings.cohere_api_key()?, settings.requests_per_minute)
            .context("Failed to create Cohere client")?;

        let embedder = CohereEmbedding::new(cohere.clone(), &settings.embed_model, settings.dimension);
        let reranker = CohereReranker::new(cohere.clone(), &settings.rerank_model);
        let generator = CohereChat::new(cohere, &settings.chat_model);
        let store = open_vector_store(settings, embedder.dimension()).await?;

        Ok(Self::new(
            Arc::new(embedder),
            store,
            Arc::new(reranker),
            Arc::new(generator),
            PipelineOptions::from(settings),
        ))
    }

    /// 질문에 답변 (에러를 전파하지 않음)
    pub async fn answer(&self, question: &str) -> AnswerResult {
        match self.run(question).await {
            Ok(result) => result,
            Err(e) => {
                let failure = PipelineFailure::classify(&e);
                tracing::error!("Query pipeline failed: {:#}", e);
                AnswerResult::failed(&failure)
            }
        }
    }

    async fn run(&self, question: &str) -> Result<AnswerResult> {
        // 1. 질의 임베딩
        let query_vector = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        // 2. 후보 검색 (텍스트 없는 결과는 버림)
        let matches = self
            .store
            .query(&query_vector, self.options.retrieve_k, true)
            .await
            .context("Failed to query vector store")?;
        let total_matches = matches.len();

        let candidates: Vec<String> = matches
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect();

        if candidates.len() < total_matches {
            tracing::warn!(
                "Dropped {} of {} matches without text metadata",
                total_matches - candidates.len(),
                total_matches
            );
        }
        if candidates.is_empty() {
            tracing::info!("No candidates with text for query");
            return Ok(AnswerResult::without_citations(
                NO_DOCUMENTS_ANSWER,
                AnswerKind::NoCandidates,
            ));
        }

        // 3. 리랭크
        let reranked = self.rerank(question, &candidates).await?;
        if reranked.is_empty() {
            tracing::info!("Reranker returned no results for {} candidates", candidates.len());
            return Ok(AnswerResult::without_citations(
                NO_RERANK_ANSWER,
                AnswerKind::NoRerankResults,
            ));
        }
        for doc in &reranked {
            tracing::debug!("Rerank #{} -> candidate {}", doc.rank, doc.original_index);
        }
        let top_docs: Vec<String> = reranked.into_iter().map(|d| d.text).collect();

        // 4-5. 프롬프트 구성 및 생성
        let prompt = build_prompt(question, &top_docs);
        let answer = self
            .generator
            .chat(&prompt, self.options.temperature)
            .await
            .context("Failed to generate answer")?;

        // 6-7. 인용 검증, 없으면 상위 문서로 대체
        let citations = resolve_citations(&answer, &top_docs);
        let (citations, kind) = if citations.is_empty() {
            tracing::warn!(
                "Answer has no in-range citations (raw: {:?}); using top {} documents",
                extract_citation_numbers(&answer),
                self.options.fallback_citations.min(top_docs.len())
            );
            (
                fallback_citations(&top_docs, self.options.fallback_citations),
                AnswerKind::FallbackCitations,
            )
        } else {
            (citations, AnswerKind::Grounded)
        };

        tracing::debug!(
            "Answered with {} citations from {} documents",
            citations.len(),
            top_docs.len()
        );

        Ok(AnswerResult {
            answer,
            citations,
            kind,
        })
    }

    /// 리랭크 후 원본 후보 텍스트로 되돌림 (리랭커 반환 순서 유지)
    async fn rerank(&self, question: &str, candidates: &[String]) -> Result<Vec<RerankedDocument>> {
        let hits = self
            .reranker
            .rerank(question, candidates, self.options.rerank_top_n)
            .await
            .context("Failed to rerank candidates")?;

        hits.into_iter()
            .map(|hit| {
                let text = candidates.get(hit.index).cloned().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Reranker returned index {} for {} candidates",
                        hit.index,
                        candidates.len()
                    )
                })?;
                Ok(RerankedDocument {
                    rank: hit.rank,
                    original_index: hit.index,
                    text,
                })
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
