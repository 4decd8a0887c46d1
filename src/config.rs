//! 설정 모듈 - 설정 파일, 환경변수, API 키 로드
//!
//! 우선순위:
//! 1. 환경변수 (`COHERE_API_KEY`, `PINECONE_API_KEY`, `CITE_RAG_INDEX`, `CITE_RAG_BACKEND`)
//!    - 작업 디렉토리의 `.env`도 여기에 포함 (이미 설정된 변수는 유지)
//! 2. 설정 파일 (`$CITE_RAG_CONFIG` 또는 `~/.cite-rag/config.toml`)
//! 3. 기본값
//!
//! ## 설정 파일 예시
//! ```toml
//! index_name = "rag-index"
//! backend = "pinecone"
//! retrieve_k = 50
//! rerank_top_n = 5
//!
//! [pinecone]
//! region = "us-east-1"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// 설정 파일 경로 환경변수
const CONFIG_ENV: &str = "CITE_RAG_CONFIG";
const COHERE_KEY_ENV: &str = "COHERE_API_KEY";
const PINECONE_KEY_ENV: &str = "PINECONE_API_KEY";

// ============================================================================
// Dotenv
// ============================================================================

/// 작업 디렉토리(또는 상위 디렉토리)의 `.env` 로드
///
/// 이미 설정된 환경변수는 덮어쓰지 않습니다. 파일이 없으면 `None`.
pub fn load_dotenv() -> Option<PathBuf> {
    report_dotenv(dotenvy::dotenv())
}

fn report_dotenv(result: dotenvy::Result<PathBuf>) -> Option<PathBuf> {
    match result {
        Ok(path) => {
            tracing::debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable .env file: {}", e);
            None
        }
    }
}

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.cite-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cite-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Pinecone serverless 인덱스 (원격)
    Pinecone,
    /// LanceDB (로컬)
    Lance,
}

impl std::str::FromStr for VectorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "lance" | "lancedb" => Ok(Self::Lance),
            other => bail!("Unknown vector backend: {} (expected pinecone or lance)", other),
        }
    }
}

/// Pinecone serverless 인덱스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeSettings {
    pub cloud: String,
    pub region: String,
    pub metric: String,
    /// 인덱스 호스트를 직접 지정 (없으면 control plane에서 조회)
    pub host: Option<String>,
}

impl Default for PineconeSettings {
    fn default() -> Self {
        Self {
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            metric: "cosine".to_string(),
            host: None,
        }
    }
}

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index_name: String,
    pub backend: VectorBackend,
    /// 임베딩 차원 (embed-english-v3.0 = 1024)
    pub dimension: usize,

    pub embed_model: String,
    pub rerank_model: String,
    pub chat_model: String,

    /// 벡터 검색 후보 수
    pub retrieve_k: usize,
    /// 리랭크 후 LLM에 전달할 문서 수
    pub rerank_top_n: usize,
    pub temperature: f32,
    /// 유효한 인용이 없을 때 대신 보여줄 문서 수
    pub fallback_citations: usize,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    /// 프로바이더 호출 속도 제한 (분당 요청 수)
    pub requests_per_minute: u32,

    pub pinecone: PineconeSettings,

    #[serde(skip_serializing)]
    pub cohere_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub pinecone_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_name: "rag-index".to_string(),
            backend: VectorBackend::Pinecone,
            dimension: 1024,
            embed_model: "embed-english-v3.0".to_string(),
            rerank_model: "rerank-v3.5".to_string(),
            chat_model: "command-a-03-2025".to_string(),
            retrieve_k: 50,
            rerank_top_n: 5,
            temperature: 0.3,
            fallback_citations: 2,
            chunk_size: 1000,
            chunk_overlap: 100,
            requests_per_minute: 100,
            pinecone: PineconeSettings::default(),
            cohere_api_key: None,
            pinecone_api_key: None,
        }
    }
}

impl Settings {
    /// 설정 로드 (파일 + 환경변수 오버라이드)
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("config.toml"));

        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// TOML 설정 파일 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// TOML 문자열 파싱
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse settings")
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(index) = non_empty_env("CITE_RAG_INDEX") {
            self.index_name = index;
        }
        if let Some(backend) = non_empty_env("CITE_RAG_BACKEND") {
            self.backend = backend.parse()?;
        }
        Ok(())
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.retrieve_k == 0 {
            bail!("retrieve_k must be greater than 0");
        }
        if self.rerank_top_n == 0 {
            bail!("rerank_top_n must be greater than 0");
        }
        if self.dimension == 0 {
            bail!("dimension must be greater than 0");
        }
        if self.fallback_citations == 0 {
            bail!("fallback_citations must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!("temperature must be within [0, 1], got {}", self.temperature);
        }
        if self.index_name.trim().is_empty() {
            bail!("index_name must not be empty");
        }
        Ok(())
    }

    /// Cohere API 키 (환경변수 > 설정 파일)
    pub fn cohere_api_key(&self) -> Result<String> {
        resolve_key(COHERE_KEY_ENV, self.cohere_api_key.as_deref()).ok_or_else(|| {
            anyhow::anyhow!(
                "Cohere API key not found. Set {} or cohere_api_key in the config file.\n\
                 Get your API key at: https://dashboard.cohere.com/api-keys",
                COHERE_KEY_ENV
            )
        })
    }

    /// Pinecone API 키 (환경변수 > 설정 파일)
    pub fn pinecone_api_key(&self) -> Result<String> {
        resolve_key(PINECONE_KEY_ENV, self.pinecone_api_key.as_deref()).ok_or_else(|| {
            anyhow::anyhow!(
                "Pinecone API key not found. Set {} or pinecone_api_key in the config file.\n\
                 Get your API key at: https://app.pinecone.io",
                PINECONE_KEY_ENV
            )
        })
    }

    /// Cohere API 키 존재 여부
    pub fn has_cohere_api_key(&self) -> bool {
        resolve_key(COHERE_KEY_ENV, self.cohere_api_key.as_deref()).is_some()
    }

    /// Pinecone API 키 존재 여부
    pub fn has_pinecone_api_key(&self) -> bool {
        resolve_key(PINECONE_KEY_ENV, self.pinecone_api_key.as_deref()).is_some()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_key(env_name: &str, from_file: Option<&str>) -> Option<String> {
    if let Some(key) = non_empty_env(env_name) {
        tracing::debug!("Using API key from {}", env_name);
        return Some(key);
    }

    from_file
        .filter(|k| !k.trim().is_empty())
        .map(str::to_string)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.index_name, "rag-index");
        assert_eq!(settings.retrieve_k, 50);
        assert_eq!(settings.rerank_top_n, 5);
        assert_eq!(settings.fallback_citations, 2);
        assert!((settings.temperature - 0.3).abs() < f32::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            index_name = "articles"
            backend = "lance"

            [pinecone]
            region = "eu-west-1"
            "#,
        )
        .unwrap();

        assert_eq!(settings.index_name, "articles");
        assert_eq!(settings.backend, VectorBackend::Lance);
        assert_eq!(settings.pinecone.region, "eu-west-1");
        assert_eq!(settings.pinecone.cloud, "aws");
        assert_eq!(settings.chunk_size, 1000);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Settings::from_toml("retrieve_k = \"many\"").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.retrieve_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.temperature = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_fallback_citations() {
        let mut settings = Settings::default();
        settings.fallback_citations = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_citations"));

        let settings = Settings::from_toml("fallback_citations = 0").unwrap();
        assert!(settings.validate().is_err());

        let settings = Settings::from_toml("fallback_citations = 1").unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Pinecone".parse::<VectorBackend>().unwrap(), VectorBackend::Pinecone);
        assert_eq!("lancedb".parse::<VectorBackend>().unwrap(), VectorBackend::Lance);
        assert!("chroma".parse::<VectorBackend>().is_err());
    }

    #[test]
    fn test_key_from_file_when_env_missing() {
        // 실제 환경변수 이름과 겹치지 않도록 별도 이름 사용
        let key = resolve_key("CITE_RAG_TEST_UNSET_KEY", Some("file-key"));
        assert_eq!(key.as_deref(), Some("file-key"));

        assert!(resolve_key("CITE_RAG_TEST_UNSET_KEY", Some("  ")).is_none());
        assert!(resolve_key("CITE_RAG_TEST_UNSET_KEY", None).is_none());
    }

    #[test]
    fn test_dotenv_fills_missing_keys_only() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        std::fs::write(
            &path,
            "CITE_RAG_TEST_DOTENV_KEY=from-dotenv\nCITE_RAG_TEST_DOTENV_KEEP=from-dotenv\n",
        )
        .unwrap();
        std::env::set_var("CITE_RAG_TEST_DOTENV_KEEP", "from-shell");

        let loaded = report_dotenv(dotenvy::from_path(&path).map(|_| path.clone()));
        assert_eq!(loaded.as_deref(), Some(path.as_path()));

        assert_eq!(
            resolve_key("CITE_RAG_TEST_DOTENV_KEY", Some("file-key")).as_deref(),
            Some("from-dotenv")
        );
        assert_eq!(
            resolve_key("CITE_RAG_TEST_DOTENV_KEEP", None).as_deref(),
            Some("from-shell")
        );
    }

    #[test]
    fn test_missing_dotenv_is_ignored() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        assert!(report_dotenv(dotenvy::from_path(&path).map(|_| path.clone())).is_none());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut settings = Settings::default();
        settings.cohere_api_key = Some("secret".to_string());
        let rendered = toml::to_string(&settings).unwrap();
        assert!(!rendered.contains("secret"));
    }
}
