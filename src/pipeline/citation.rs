//! 인용 추출 - 답변 텍스트의 `[n]` 표시를 컨텍스트 문서로 연결
//!
//! 규칙:
//! - 대괄호로 둘러싼 10진수(`[12]`)만 인용으로 인식 (공백, 부호, 문자 포함 시 무시)
//! - 숫자는 ASCII `0-9`만 허용 (`[٢]` 같은 다른 문자 체계의 숫자는 인용이 아님)
//! - 등장 순서 유지, 중복 허용 (중복 제거는 표시 계층에서)
//! - 1 <= n <= 문서 수 인 번호만 유효

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([0-9]+)\]").expect("citation pattern is valid"));

/// 인용 (번호, 원문)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationReference {
    /// 1-based 인용 번호
    pub number: usize,
    pub source_text: String,
}

/// 답변에서 모든 인용 번호 추출 (범위 확인 전)
///
/// usize로 표현할 수 없는 번호는 인용이 아닌 것으로 봅니다.
pub fn extract_citation_numbers(answer: &str) -> Vec<usize> {
    CITATION_RE
        .captures_iter(answer)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// 범위 내 인용만 문서로 연결
pub fn resolve_citations(answer: &str, documents: &[String]) -> Vec<CitationReference> {
    extract_citation_numbers(answer)
        .into_iter()
        .filter(|&n| n >= 1 && n <= documents.len())
        .map(|n| CitationReference {
            number: n,
            source_text: documents[n - 1].clone(),
        })
        .collect()
}

/// 대체 인용: 앞에서부터 최대 `limit`개 문서, 1부터 번호 부여
pub fn fallback_citations(documents: &[String], limit: usize) -> Vec<CitationReference> {
    documents
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, doc)| CitationReference {
            number: i + 1,
            source_text: doc.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("d{}", i)).collect()
    }

    fn numbers(citations: &[CitationReference]) -> Vec<usize> {
        citations.iter().map(|c| c.number).collect()
    }

    #[test]
    fn test_extract_order_and_duplicates() {
        assert_eq!(
            extract_citation_numbers("First [2], then [1], again [2]."),
            vec![2, 1, 2]
        );
    }

    #[test]
    fn test_malformed_brackets_ignored() {
        let text = "[a] [ 1 ] [-2] [1.5] [] [3";
        assert!(extract_citation_numbers(text).is_empty());
    }

    #[test]
    fn test_non_ascii_digits_ignored() {
        // 아랍-인도 숫자 2, 전각 숫자 1
        assert!(extract_citation_numbers("[\u{0662}] [\u{FF11}]").is_empty());
        assert_eq!(extract_citation_numbers("[\u{0662}] [2]"), vec![2]);
    }

    #[test]
    fn test_adjacent_and_leading_zero() {
        assert_eq!(extract_citation_numbers("[1][02]"), vec![1, 2]);
    }

    #[test]
    fn test_overflowing_number_ignored() {
        let text = "[99999999999999999999999999] [1]";
        assert_eq!(extract_citation_numbers(text), vec![1]);
    }

    #[test]
    fn test_resolve_filters_out_of_range() {
        let citations = resolve_citations("[0] [1] [3] [4] [7]", &docs(3));
        assert_eq!(numbers(&citations), vec![1, 3]);
        assert_eq!(citations[1].source_text, "d2");
    }

    #[test]
    fn test_resolve_maps_to_position() {
        let citations = resolve_citations("see [2]", &docs(3));
        assert_eq!(
            citations,
            vec![CitationReference {
                number: 2,
                source_text: "d1".to_string()
            }]
        );
    }

    #[test]
    fn test_fallback_caps_at_limit() {
        let citations = fallback_citations(&docs(5), 2);
        assert_eq!(numbers(&citations), vec![1, 2]);
        assert_eq!(citations[1].source_text, "d1");

        assert_eq!(numbers(&fallback_citations(&docs(1), 2)), vec![1]);
        assert!(fallback_citations(&[], 2).is_empty());
    }
}
