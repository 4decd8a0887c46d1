//! Knowledge 모듈 - 벡터 저장소와 인덱싱
//!
//! - Pinecone: 원격 serverless 인덱스 (기본)
//! - LanceDB: 로컬 대체 백엔드
//! - Chunker: 재귀 문자 분할
//! - Indexer: 청킹 -> 임베딩 -> upsert

mod chunker;
mod indexer;
mod lance;
mod pinecone;
mod vector;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{get_data_dir, Settings, VectorBackend};

// Re-exports
pub use chunker::{
    default_chunker, recursive_chunker, ChunkConfig, Chunker, RecursiveChunker, DEFAULT_SEPARATORS,
};
pub use indexer::{IndexReport, Indexer, SOURCE_KEY};
pub use lance::LanceVectorStore;
pub use pinecone::{IndexDescription, IndexStatus, PineconeControl, PineconeIndex};
pub use vector::{Metadata, VectorMatch, VectorRecord, VectorStore, TEXT_KEY};

/// 설정에 따라 벡터 저장소 열기 (질의용, 인덱스를 만들지 않음)
///
/// `dimension`은 임베딩 프로바이더의 벡터 차원입니다.
pub async fn open_vector_store(
    settings: &Settings,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    match settings.backend {
        VectorBackend::Pinecone => {
            let index = PineconeIndex::connect(
                settings.pinecone_api_key()?,
                &settings.index_name,
                &settings.pinecone,
            )
            .await
            .context("Failed to connect to Pinecone index")?;
            Ok(Arc::new(index))
        }
        VectorBackend::Lance => Ok(Arc::new(open_lance(settings, dimension).await?)),
    }
}

/// 인덱싱용 벡터 저장소 (Pinecone이면 인덱스가 없을 때 생성)
pub async fn prepare_vector_store(
    settings: &Settings,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    match settings.backend {
        VectorBackend::Pinecone => {
            let api_key = settings.pinecone_api_key()?;
            let host = match settings.pinecone.host {
                Some(ref host) => host.clone(),
                None => {
                    let control = PineconeControl::new(api_key.clone())?;
                    control
                        .ensure_index(&settings.index_name, dimension, &settings.pinecone)
                        .await?
                        .host
                }
            };
            Ok(Arc::new(PineconeIndex::new(api_key, &settings.index_name, &host)?))
        }
        VectorBackend::Lance => Ok(Arc::new(open_lance(settings, dimension).await?)),
    }
}

async fn open_lance(settings: &Settings, dimension: usize) -> Result<LanceVectorStore> {
    let path = get_data_dir().join("vectors.lance");
    LanceVectorStore::open(&path, &settings.index_name, dimension)
        .await
        .context("Failed to open LanceDB vector store")
}
