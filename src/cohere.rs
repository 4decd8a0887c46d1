//! Cohere API 공통 클라이언트
//!
//! source: https://docs.cohere.com/reference/about
//!
//! 임베딩, 리랭크, 채팅 프로바이더가 하나의 HTTP 클라이언트와
//! 호출 간격 제한(Throttle)을 공유합니다. 재시도는 하지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ProviderError;

/// Cohere API 베이스 URL
pub const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// 에러 메시지에 쓰이는 프로바이더 이름
pub(crate) const PROVIDER: &str = "Cohere";

// ============================================================================
// Throttle
// ============================================================================

/// 호출 간 최소 간격 유지 (버스트 방지)
#[derive(Debug)]
pub(crate) struct Throttle {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl Throttle {
    pub(crate) fn per_minute(requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / requests_per_minute
        };

        Self {
            min_interval,
            last_request: None,
        }
    }

    /// 다음 요청까지 남은 대기 시간
    fn wait_time(&self, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => self.min_interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub(crate) async fn acquire(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Throttle: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.last_request = Some(Instant::now());
    }
}

// ============================================================================
// CohereClient
// ============================================================================

/// Cohere 에러 응답 본문
#[derive(Debug, Deserialize)]
struct CohereErrorBody {
    message: String,
}

/// Cohere HTTP 클라이언트 (프로세스당 하나, 복제해서 공유)
#[derive(Debug, Clone)]
pub struct CohereClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    throttle: Arc<Mutex<Throttle>>,
}

impl CohereClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `api_key` - Cohere API 키
    /// * `requests_per_minute` - 분당 최대 호출 수 (0이면 제한 없음)
    pub fn new(api_key: String, requests_per_minute: u32) -> Result<Self> {
        Self::with_base_url(api_key, requests_per_minute, COHERE_BASE_URL)
    }

    pub fn with_base_url(api_key: String, requests_per_minute: u32, base_url: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Cohere API key must not be empty");
        }

        // 요청 타임아웃 없음 (필요하면 호출 측에서 감쌈)
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: Arc::new(Mutex::new(Throttle::per_minute(requests_per_minute))),
        })
    }

    /// JSON POST 요청
    pub(crate) async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        {
            let mut throttle = self.throttle.lock().await;
            throttle.acquire().await;
        }

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        decode_response(status.as_u16(), &text)
    }
}

/// 응답 본문 해석 (성공이면 역직렬화, 실패면 ProviderError::Api)
fn decode_response<Resp: DeserializeOwned>(status: u16, body: &str) -> Result<Resp, ProviderError> {
    if (200..300).contains(&status) {
        return serde_json::from_str(body).map_err(|source| ProviderError::Decode {
            provider: PROVIDER,
            source,
        });
    }

    let message = serde_json::from_str::<CohereErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());

    Err(ProviderError::Api {
        provider: PROVIDER,
        status,
        message,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Echo {
        text: String,
    }

    #[test]
    fn test_decode_success() {
        let echo: Echo = decode_response(200, r#"{"text": "hi"}"#).unwrap();
        assert_eq!(echo.text, "hi");
    }

    #[test]
    fn test_decode_api_error_message() {
        let err = decode_response::<Echo>(429, r#"{"message": "trial key limit"}"#).unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(
            err.to_string(),
            "Cohere API error (status 429): trial key limit"
        );
    }

    #[test]
    fn test_decode_api_error_plain_body() {
        let err = decode_response::<Echo>(502, "Bad Gateway\n").unwrap_err();
        match err {
            ProviderError::Api { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_malformed_success_body() {
        let err = decode_response::<Echo>(200, "not json").unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[test]
    fn test_throttle_interval() {
        let throttle = Throttle::per_minute(60);
        assert_eq!(throttle.min_interval, Duration::from_secs(1));

        let unlimited = Throttle::per_minute(0);
        assert_eq!(unlimited.min_interval, Duration::ZERO);
    }

    #[test]
    fn test_throttle_first_request_no_wait() {
        let throttle = Throttle::per_minute(60);
        assert_eq!(throttle.wait_time(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_throttle_waits_after_request() {
        let now = Instant::now();
        let throttle = Throttle {
            min_interval: Duration::from_secs(1),
            last_request: Some(now),
        };
        assert!(throttle.wait_time(now) > Duration::from_millis(900));
    }

    /// 응답 전에 `delay`만큼 기다리는 1회용 로컬 서버
    async fn slow_server(delay: Duration, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_is_not_cut_off() {
        let base_url = slow_server(Duration::from_secs(120), r#"{"text":"late"}"#).await;
        let client = CohereClient::with_base_url("fake_key".to_string(), 0, &base_url).unwrap();

        let echo: Echo = client
            .post("/v1/chat", &serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(echo.text, "late");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(CohereClient::new("  ".to_string(), 60).is_err());
        assert!(CohereClient::new("fake_key".to_string(), 60).is_ok());
    }
}
