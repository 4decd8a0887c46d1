//! Pinecone Vector Store - 원격 serverless 인덱스
//!
//! source: https://docs.pinecone.io/reference/api/introduction
//!
//! - Control plane (api.pinecone.io): 인덱스 조회/생성
//! - Data plane (인덱스 호스트): query, upsert, describe_index_stats

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PineconeSettings;
use crate::error::ProviderError;

use super::vector::{Metadata, VectorMatch, VectorRecord, VectorStore};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const PROVIDER: &str = "Pinecone";

/// 한 번의 upsert 요청에 담는 최대 레코드 수
const UPSERT_BATCH_SIZE: usize = 100;

/// 인덱스 준비 대기 (최대 READY_POLL_ATTEMPTS * READY_POLL_INTERVAL)
const READY_POLL_ATTEMPTS: u32 = 60;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

/// 인덱스 정보 (control plane)
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

/// Pinecone 에러 본문 (data plane / control plane 형식 모두)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<NestedError>,
}

#[derive(Debug, Deserialize)]
struct NestedError {
    message: String,
}

// ============================================================================
// HTTP Helpers
// ============================================================================

fn build_http() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .context("Failed to create HTTP client")
}

/// 요청 전송 후 (status, body) 반환
async fn send(
    builder: reqwest::RequestBuilder,
    api_key: &str,
) -> Result<(u16, String), ProviderError> {
    let response = builder
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;

    Ok((status, body))
}

fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ProviderError> {
    if !(200..300).contains(&status) {
        return Err(api_error(status, body));
    }

    serde_json::from_str(body).map_err(|source| ProviderError::Decode {
        provider: PROVIDER,
        source,
    })
}

fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.error.map(|n| n.message)))
        .unwrap_or_else(|| body.trim().to_string());

    ProviderError::Api {
        provider: PROVIDER,
        status,
        message,
    }
}

/// 호스트 문자열을 URL로 (스킴이 없으면 https)
fn normalize_host(host: &str) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');
    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    Url::parse(&with_scheme).with_context(|| format!("Invalid Pinecone host: {}", host))
}

// ============================================================================
// PineconeControl
// ============================================================================

/// Control plane 클라이언트 (인덱스 관리)
pub struct PineconeControl {
    http: reqwest::Client,
    api_key: String,
}

impl PineconeControl {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: build_http()?,
            api_key,
        })
    }

    /// 인덱스 조회 (없으면 None)
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", CONTROL_PLANE_URL, name);
        let (status, body) = send(self.http.get(&url), &self.api_key).await?;

        if status == 404 {
            return Ok(None);
        }

        Ok(Some(decode(status, &body)?))
    }

    async fn create_index(
        &self,
        name: &str,
        dimension: usize,
        settings: &PineconeSettings,
    ) -> Result<()> {
        let request = CreateIndexRequest {
            name,
            dimension,
            metric: &settings.metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &settings.cloud,
                    region: &settings.region,
                },
            },
        };

        let url = format!("{}/indexes", CONTROL_PLANE_URL);
        let (status, body) = send(self.http.post(&url).json(&request), &self.api_key).await?;

        // 409: 다른 프로세스가 먼저 생성함
        if status == 409 {
            tracing::debug!("Index '{}' was created concurrently", name);
            return Ok(());
        }
        if !(200..300).contains(&status) {
            return Err(api_error(status, &body).into());
        }

        Ok(())
    }

    /// 인덱스가 없으면 생성하고 준비될 때까지 대기
    pub async fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
        settings: &PineconeSettings,
    ) -> Result<IndexDescription> {
        match self.describe_index(name).await? {
            Some(existing) => {
                tracing::info!("Index '{}' already exists. Connecting to it.", name);
                if existing.dimension != dimension {
                    anyhow::bail!(
                        "Index '{}' has dimension {}, but the embedding model produces {}",
                        name,
                        existing.dimension,
                        dimension
                    );
                }
                if existing.status.ready {
                    return Ok(existing);
                }
            }
            None => {
                self.create_index(name, dimension, settings)
                    .await
                    .with_context(|| format!("Failed to create index '{}'", name))?;
                tracing::info!("Index '{}' created successfully.", name);
            }
        }

        self.wait_until_ready(name).await
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        for attempt in 1..=READY_POLL_ATTEMPTS {
            if let Some(desc) = self.describe_index(name).await? {
                if desc.status.ready {
                    return Ok(desc);
                }
                tracing::debug!(
                    "Index '{}' not ready (state: {}, attempt {}/{})",
                    name,
                    desc.status.state,
                    attempt,
                    READY_POLL_ATTEMPTS
                );
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        anyhow::bail!(
            "Index '{}' did not become ready within {:?}",
            name,
            READY_POLL_INTERVAL * READY_POLL_ATTEMPTS
        )
    }
}

// ============================================================================
// PineconeIndex
// ============================================================================

/// Pinecone 인덱스 (data plane)
pub struct PineconeIndex {
    http: reqwest::Client,
    api_key: String,
    host: Url,
    name: String,
}

impl PineconeIndex {
    /// 호스트를 알고 있을 때 직접 생성
    ///
    /// # Arguments
    /// * `api_key` - Pinecone API 키
    /// * `name` - 인덱스 이름 (로그용)
    /// * `host` - 인덱스 호스트 (예: rag-index-abc123.svc.aped-4627-b74a.pinecone.io)
    pub fn new(api_key: String, name: impl Into<String>, host: &str) -> Result<Self> {
        Ok(Self {
            http: build_http()?,
            api_key,
            host: normalize_host(host)?,
            name: name.into(),
        })
    }

    /// 인덱스 이름으로 연결 (설정에 host가 없으면 control plane에서 조회)
    pub async fn connect(api_key: String, name: &str, settings: &PineconeSettings) -> Result<Self> {
        if let Some(ref host) = settings.host {
            return Self::new(api_key, name, host);
        }

        let control = PineconeControl::new(api_key.clone())?;
        let desc = control
            .describe_index(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pinecone index '{}' not found. Run `index` first.", name))?;

        Self::new(api_key, name, &desc.host)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.host
            .join(path)
            .with_context(|| format!("Invalid Pinecone endpoint: {}", path))
    }

    async fn post<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = self.endpoint(path)?;
        tracing::debug!("POST {}", url);
        let (status, text) = send(self.http.post(url).json(body), &self.api_key).await?;
        Ok(decode(status, &text)?)
    }
}

#[async_trait]
impl VectorStore for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };

        let response: QueryResponse = self.post("query", &request).await?;
        Ok(response.matches)
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut upserted = 0;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let response: UpsertResponse = self
                .post("vectors/upsert", &UpsertRequest { vectors: batch })
                .await
                .context("Failed to upsert vectors")?;
            upserted += response.upserted_count;
        }

        Ok(upserted)
    }

    async fn count(&self) -> Result<usize> {
        let stats: IndexStats = self
            .post("describe_index_stats", &Metadata::new())
            .await
            .context("Failed to describe index stats")?;
        Ok(stats.total_vector_count)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Tests
// ============================================================================
