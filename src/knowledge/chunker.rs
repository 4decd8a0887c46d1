//! Text Chunking Module
//!
//! 구분자 우선순위(문단 > 줄 > 단어 > 문자)에 따라 재귀적으로 텍스트를 나누고,
//! 인접 청크 사이에 지정한 만큼의 문자를 겹치게 합니다.
//! 길이는 모두 문자(char) 수 기준입니다.

use std::collections::VecDeque;

use anyhow::{bail, Result};

/// 기본 구분자 (문단, 줄, 공백, 문자)
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    /// 우선순위 순 구분자
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::with_size(1000, 100)
    }
}

impl ChunkConfig {
    /// 크기/오버랩 지정 (기본 구분자)
    pub fn with_size(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 인덱싱 요구 범위 검증
    ///
    /// - 청크 크기: 800 ~ 1200 문자
    /// - 오버랩: 청크 크기의 10% ~ 15%
    pub fn validate(&self) -> Result<()> {
        if !(800..=1200).contains(&self.chunk_size) {
            bail!(
                "chunk_size must be between 800 and 1200 characters, got {}",
                self.chunk_size
            );
        }

        let min_overlap = self.chunk_size.div_ceil(10);
        let max_overlap = self.chunk_size * 15 / 100;
        if !(min_overlap..=max_overlap).contains(&self.chunk_overlap) {
            bail!(
                "chunk_overlap must be 10-15% of chunk_size ({}..={}), got {}",
                min_overlap,
                max_overlap,
                self.chunk_overlap
            );
        }

        if self.separators.is_empty() {
            bail!("at least one separator is required");
        }

        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 문자 분할 청커
///
/// 1. 텍스트에 존재하는 첫 번째 구분자로 자름
/// 2. 청크 크기보다 긴 조각은 다음 구분자로 다시 자름
/// 3. 작은 조각들은 청크 크기까지 합치고, 끝부분을 오버랩으로 남김
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 텍스트에 존재하는 첫 구분자 (빈 구분자는 항상 일치)
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            split_chars(text)
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator));
                pending.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator));
        }

        chunks
    }

    /// 조각들을 청크 크기까지 합침 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let sep_len = char_len(separator);

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > size && !window.is_empty() {
                if total > size {
                    tracing::warn!("Created a chunk of size {}, which is longer than {}", total, size);
                }
                push_joined(&mut chunks, &window, separator);

                // 오버랩 크기 이하가 되고 새 조각이 들어갈 때까지 앞에서 제거
                while total > overlap || (joined_len(&window, total) > size && total > 0) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.config.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 문자 단위 분할 (UTF-8 안전)
fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

/// 설정 지정 청커 생성 (범위 검증 포함)
pub fn recursive_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    config.validate()?;
    Ok(Box::new(RecursiveChunker::new(config)))
}

// ============================================================================
// Tests
// ============================================================================
