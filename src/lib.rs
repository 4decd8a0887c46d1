//! cite-rag - 인용 검증 RAG 질의응답
//!
//! 질문을 임베딩해 벡터 저장소에서 후보를 찾고, 리랭크한 상위 문서만으로
//! LLM에 답변을 요청한 뒤, 답변의 `[n]` 인용을 원문 문서에 연결합니다.

pub mod cli;
pub mod cohere;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod rerank;

// Re-exports
pub use cohere::CohereClient;
pub use config::{get_data_dir, PineconeSettings, Settings, VectorBackend};
pub use embedding::{CohereEmbedding, EmbedMode, EmbeddingProvider};
pub use error::{PipelineFailure, ProviderError};
pub use generation::{AnswerGenerator, CohereChat};
pub use knowledge::{
    ChunkConfig, Chunker, IndexReport, Indexer, LanceVectorStore, PineconeIndex,
    RecursiveChunker, VectorMatch, VectorRecord, VectorStore,
};
pub use pipeline::{
    AnswerKind, AnswerResult, CitationReference, PipelineOptions, QueryPipeline, RerankedDocument,
};
pub use rerank::{CohereReranker, RerankHit, Reranker};
