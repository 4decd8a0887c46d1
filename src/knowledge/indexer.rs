//! Indexer - 텍스트를 청크로 나누어 임베딩 후 벡터 저장소에 저장
//!
//! 청크 ID는 `chunk-<i>` 형식이며, 같은 텍스트를 다시 인덱싱하면
//! 기존 레코드를 덮어씁니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::embedding::{EmbedMode, EmbeddingProvider};

use super::chunker::Chunker;
use super::vector::{VectorRecord, VectorStore};

/// 메타데이터에 원본 위치를 기록하는 키
pub const SOURCE_KEY: &str = "source";

/// 인덱싱 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub chunks: usize,
    pub upserted: usize,
}

/// 인덱서
pub struct Indexer {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// 텍스트 인덱싱
    ///
    /// # Arguments
    /// * `text` - 원본 텍스트
    /// * `source` - 원본 위치 (파일 경로 등), 메타데이터에 기록
    pub async fn index_text(&self, text: &str, source: Option<&str>) -> Result<IndexReport> {
        let chunks = self.chunker.chunk(text);
        tracing::info!("Total chunks created: {} ({})", chunks.len(), self.chunker.name());

        if chunks.is_empty() {
            tracing::warn!("No chunks generated; nothing to index");
            return Ok(IndexReport {
                chunks: 0,
                upserted: 0,
            });
        }

        let embeddings = self
            .embedder
            .embed(&chunks, EmbedMode::Document)
            .await
            .context("Failed to embed chunks")?;

        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, values))| {
                let mut record = VectorRecord::for_chunk(format!("chunk-{}", i), values, chunk);
                if let Some(source) = source {
                    record
                        .metadata
                        .insert(SOURCE_KEY.to_string(), Value::String(source.to_string()));
                }
                record
            })
            .collect();

        let upserted = self
            .store
            .upsert(&records)
            .await
            .context("Failed to upsert vectors")?;

        tracing::info!(
            "Upserted {} chunks into vector store '{}'",
            upserted,
            self.store.name()
        );

        Ok(IndexReport {
            chunks: chunks.len(),
            upserted,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
