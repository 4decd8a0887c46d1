//! 답변 생성 모듈 - 채팅 LLM 호출
//!
//! source: https://docs.cohere.com/v1/reference/chat

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cohere::CohereClient;

/// 답변 생성기 트레이트
///
/// 단일 프롬프트를 받아 자유 텍스트를 돌려줍니다.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn chat(&self, prompt: &str, temperature: f32) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}

/// Cohere 채팅 구현체
#[derive(Debug, Clone)]
pub struct CohereChat {
    client: CohereClient,
    model: String,
}

impl CohereChat {
    pub fn new(client: CohereClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for CohereChat {
    async fn chat(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            message: prompt,
            temperature,
        };

        let response: ChatResponse = self
            .client
            .post("/v1/chat", &request)
            .await
            .context("Failed to generate answer")?;

        Ok(response.text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
