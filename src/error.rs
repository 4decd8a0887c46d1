//! 에러 모듈 - 프로바이더 에러와 파이프라인 실패 분류
//!
//! 외부 프로바이더(Cohere, Pinecone)가 보고한 실패는 `ProviderError`로 표현되고,
//! 파이프라인 경계에서 `PipelineFailure`로 분류되어 사용자 메시지로 바뀝니다.

use thiserror::Error;

// ============================================================================
// ProviderError
// ============================================================================

/// 외부 프로바이더 호출 실패
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 프로바이더가 보고한 API 에러 (non-2xx 응답)
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// 네트워크/전송 실패
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// 응답 본문 해석 실패
    #[error("{provider} returned an unreadable response: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    /// 프로바이더 이름
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Api { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Decode { provider, .. } => *provider,
        }
    }

    /// Rate limit 여부 (API 에러 설명에 "429" 포함)
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { .. }) && self.to_string().contains("429")
    }
}

// ============================================================================
// PipelineFailure
// ============================================================================

/// 파이프라인 실패 분류
///
/// `answer()`는 절대 에러를 전파하지 않으며, 모든 실패는 이 분류를 거쳐
/// 사용자에게 보여줄 메시지로 변환됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// 프로바이더 rate limit
    RateLimited { provider: &'static str },
    /// 그 외 프로바이더 API 에러 (원본 메시지 포함)
    ProviderApi(String),
    /// 프로바이더 외 실패 (네트워크, 파싱, 로직 오류)
    Unexpected(String),
}

impl PipelineFailure {
    /// anyhow 에러 체인을 분류
    pub fn classify(err: &anyhow::Error) -> Self {
        let provider_err = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<ProviderError>());

        match provider_err {
            Some(e @ ProviderError::Api { .. }) if e.is_rate_limited() => Self::RateLimited {
                provider: e.provider(),
            },
            Some(e @ ProviderError::Api { .. }) => Self::ProviderApi(e.to_string()),
            _ => Self::Unexpected(format!("{:#}", err)),
        }
    }

    /// 사용자에게 보여줄 메시지
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { provider } => format!(
                "Error: {} API rate limit exceeded. Please wait and try again.",
                provider
            ),
            Self::ProviderApi(detail) => format!("An API error occurred: {}", detail),
            Self::Unexpected(detail) => format!("An unexpected error occurred: {}", detail),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, message: &str) -> ProviderError {
        ProviderError::Api {
            provider: "Cohere",
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_status_429_is_rate_limited() {
        let err = anyhow::Error::from(api_error(429, "too many requests"));
        assert_eq!(
            PipelineFailure::classify(&err),
            PipelineFailure::RateLimited { provider: "Cohere" }
        );
    }

    #[test]
    fn test_429_in_message_is_rate_limited() {
        // 게이트웨이가 429를 본문에만 담아 보내는 경우
        let err = anyhow::Error::from(api_error(500, "upstream returned 429"));
        let failure = PipelineFailure::classify(&err);
        assert!(matches!(failure, PipelineFailure::RateLimited { .. }));
        assert!(failure.user_message().contains("rate limit exceeded"));
    }

    #[test]
    fn test_other_api_error_keeps_message() {
        let err = anyhow::Error::from(api_error(400, "invalid model"));
        let failure = PipelineFailure::classify(&err);
        assert_eq!(
            failure.user_message(),
            "An API error occurred: Cohere API error (status 400): invalid model"
        );
    }

    #[test]
    fn test_api_error_found_through_context() {
        let err = anyhow::Error::from(api_error(503, "overloaded")).context("Failed to rerank");
        assert!(matches!(
            PipelineFailure::classify(&err),
            PipelineFailure::ProviderApi(_)
        ));
    }

    #[test]
    fn test_non_provider_error_is_unexpected() {
        let err = anyhow::anyhow!("connection reset");
        let failure = PipelineFailure::classify(&err);
        assert_eq!(
            failure.user_message(),
            "An unexpected error occurred: connection reset"
        );
    }

    #[test]
    fn test_decode_error_is_unexpected_even_with_429() {
        let source = serde_json::from_str::<u32>("\"429\"").unwrap_err();
        let err = anyhow::Error::from(ProviderError::Decode {
            provider: "Pinecone",
            source,
        });
        assert!(matches!(
            PipelineFailure::classify(&err),
            PipelineFailure::Unexpected(_)
        ));
    }
}
