//! Vector Store - 벡터 검색 트레이트 및 타입
//!
//! 벡터 저장소는 (id, vector, metadata) 레코드를 보관하고
//! ANN (Approximate Nearest Neighbor) 검색을 제공합니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 레코드 메타데이터
pub type Metadata = Map<String, Value>;

/// 청크 텍스트가 저장되는 메타데이터 키
pub const TEXT_KEY: &str = "text";

// ============================================================================
// Types
// ============================================================================

/// 저장용 레코드
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// 청크 ID (예: chunk-0)
    pub id: String,
    /// 임베딩 벡터
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

impl VectorRecord {
    /// 청크 텍스트로 레코드 생성
    pub fn for_chunk(id: impl Into<String>, values: Vec<f32>, text: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
        Self {
            id: id.into(),
            values,
            metadata,
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// 유사도 스코어 (높을수록 가까움)
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl VectorMatch {
    /// 메타데이터의 청크 텍스트 (없거나 문자열이 아니면 None)
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(TEXT_KEY))
            .and_then(Value::as_str)
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 가장 가까운 `top_k`개 검색 (유사도 내림차순)
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>>;

    /// 레코드 삽입 (같은 id는 덮어씀), 반영된 개수 반환
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 저장된 벡터 개수
    async fn count(&self) -> Result<usize>;

    /// 저장소 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
