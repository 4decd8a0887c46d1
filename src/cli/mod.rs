//! CLI 모듈
//!
//! cite-rag CLI 명령어 정의 및 구현.
//! 답변 표시 규칙(인용 중복 제거, 원문 자르기)도 여기서 처리합니다.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cohere::CohereClient;
use crate::config::{get_data_dir, Settings};
use crate::embedding::{CohereEmbedding, EmbeddingProvider};
use crate::knowledge::{open_vector_store, prepare_vector_store, recursive_chunker, ChunkConfig, Indexer};
use crate::pipeline::{AnswerResult, CitationReference, QueryPipeline};

/// 표시할 원문 최대 길이 (문자 수)
pub const SOURCE_DISPLAY_CHARS: usize = 400;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "cite-rag")]
#[command(version, about = "인용 검증 RAG 질의응답", long_about = None)]
pub struct Cli {
    /// 벡터 저장소 백엔드 (pinecone, lance)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// 인덱스 이름
    #[arg(long, global = true)]
    pub index: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문하고 인용이 달린 답변 받기
    Ask {
        /// 질문
        question: String,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 대화형 질의 (exit로 종료)
    Chat,

    /// 텍스트 파일을 인덱싱
    Index {
        /// 인덱싱할 파일 경로
        #[arg(short, long)]
        file: PathBuf,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load().context("설정 로드 실패")?;
    if let Some(backend) = cli.backend {
        settings.backend = backend.parse()?;
    }
    if let Some(index) = cli.index {
        settings.index_name = index;
    }

    match cli.command {
        Commands::Ask { question, json } => cmd_ask(&settings, &question, json).await,
        Commands::Chat => cmd_chat(&settings).await,
        Commands::Index { file } => cmd_index(&settings, &file).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(settings: &Settings, question: &str, json: bool) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Please enter a question.");
    }

    let pipeline = QueryPipeline::from_settings(settings)
        .await
        .context("파이프라인 초기화 실패")?;

    if !json {
        println!("[*] Processing your request...");
    }
    let result = pipeline.answer(question.trim()).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("결과 직렬화 실패")?
        );
    } else {
        println!("\n{}", render_answer(&result));
    }

    Ok(())
}

/// 대화형 명령어 (chat)
///
/// 파이프라인은 한 번만 만들고 모든 질문에 재사용합니다.
async fn cmd_chat(settings: &Settings) -> Result<()> {
    let pipeline = QueryPipeline::from_settings(settings)
        .await
        .context("파이프라인 초기화 실패")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nAsk a question about the indexed articles (or type 'exit' to quit): ");
        std::io::stdout().flush().context("stdout flush 실패")?;

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            println!("[!] Please enter a question.");
            continue;
        }

        let result = pipeline.answer(question).await;
        println!("\n{}", render_answer(&result));
    }

    Ok(())
}

/// 인덱싱 명령어 (index)
async fn cmd_index(settings: &Settings, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", file.display()))?;

    let chunker = recursive_chunker(ChunkConfig::with_size(
        settings.chunk_size,
        settings.chunk_overlap,
    ))?;

    let cohere = CohereClient::new(settings.cohere_api_key()?, settings.requests_per_minute)?;
    let embedder = CohereEmbedding::new(cohere, &settings.embed_model, settings.dimension);

    println!("[*] 인덱스 준비 중: {}", settings.index_name);
    let store = prepare_vector_store(settings, embedder.dimension())
        .await
        .context("벡터 저장소 준비 실패")?;

    println!("[*] 청킹 및 임베딩 중: {}", file.display());
    let indexer = Indexer::new(chunker, Arc::new(embedder), store);
    let source = file.display().to_string();
    let report = indexer
        .index_text(&text, Some(&source))
        .await
        .context("인덱싱 실패")?;

    println!(
        "[OK] 인덱싱 완료: 청크 {}개, 저장 {}개",
        report.chunks, report.upserted
    );

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("cite-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!("[*] 백엔드: {:?}, 인덱스: {}", settings.backend, settings.index_name);
    println!(
        "[*] 모델: {} / {} / {}",
        settings.embed_model, settings.rerank_model, settings.chat_model
    );

    let cohere_ok = settings.has_cohere_api_key();
    let pinecone_ok = settings.has_pinecone_api_key();
    println!("{} Cohere API 키", if cohere_ok { "[OK]" } else { "[!] 미설정:" });
    println!("{} Pinecone API 키", if pinecone_ok { "[OK]" } else { "[!] 미설정:" });

    match open_vector_store(settings, settings.dimension).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
            Err(e) => println!("[!] 벡터 개수 조회 실패: {}", e),
        },
        Err(e) => {
            println!("[!] 벡터 저장소 연결 실패");
            tracing::debug!("Vector store unavailable: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Presentation
// ============================================================================

/// 답변과 출처를 출력용 문자열로
pub fn render_answer(result: &AnswerResult) -> String {
    let mut out = String::new();
    out.push_str("------------------ Answer ------------------\n");
    out.push_str(&result.answer);
    out.push('\n');

    let sources = unique_sources(&result.citations);
    if sources.is_empty() {
        out.push_str("\n[i] No sources were used to generate this answer.\n");
        return out;
    }

    out.push_str("\n------------------ Sources -----------------\n");
    for (number, text) in sources {
        out.push_str(&format!("[{}] {}\n", number, text));
    }
    out
}

/// 인용 번호 기준 중복 제거 (첫 등장 순서 유지) + 원문 자르기
pub fn unique_sources(citations: &[CitationReference]) -> Vec<(usize, String)> {
    let mut seen = HashSet::new();
    citations
        .iter()
        .filter(|c| seen.insert(c.number))
        .map(|c| (c.number, truncate_source(&c.source_text, SOURCE_DISPLAY_CHARS)))
        .collect()
}

/// 원문 자르기 (UTF-8 안전)
fn truncate_source(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
