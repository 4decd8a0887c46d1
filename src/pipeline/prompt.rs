//! 프롬프트 구성 - 번호가 붙은 컨텍스트와 인용 규칙

/// 모델이 답을 모를 때 써야 하는 문구
pub const FALLBACK_PHRASE: &str = "I don't know";

/// 컨텍스트 블록 생성
///
/// 위치 i(0-based)의 문서는 `[i+1]`로 표시됩니다.
pub fn build_context(documents: &[String]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] {}", i + 1, doc))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 답변 생성 프롬프트
pub fn build_prompt(question: &str, documents: &[String]) -> String {
    let labels = documents
        .iter()
        .enumerate()
        .map(|(i, _)| format!("[{}]", i + 1))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a helpful AI assistant. \
         Use only the following context to answer the question. \
         Do not use outside knowledge. \
         If the answer is not present in the context, say '{fallback}'.\n\
         When answering, you MUST cite sources using only the numbers provided in the context \
         ({labels}), that is [1] through [{max}]. \
         Never invent a citation number outside that range. \
         If no citation is relevant, say '{fallback}.'\n\n\
         Context:\n{context}\n\nQuestion:\n{question}",
        fallback = FALLBACK_PHRASE,
        labels = labels,
        max = documents.len(),
        context = build_context(documents),
        question = question,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<String> {
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    }

    #[test]
    fn test_context_labels_follow_position() {
        assert_eq!(build_context(&docs()), "[1] alpha\n\n[2] beta\n\n[3] gamma");
    }

    #[test]
    fn test_context_empty() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_prompt_constraints() {
        let prompt = build_prompt("What is beta?", &docs());

        assert!(prompt.contains("Use only the following context"));
        assert!(prompt.contains("'I don't know'"));
        assert!(prompt.contains("([1], [2], [3]), that is [1] through [3]"));
        assert!(prompt.contains("Never invent a citation number"));
        assert!(prompt.contains("If no citation is relevant, say 'I don't know.'"));
        assert!(prompt.contains("[2] beta"));
        assert!(prompt.ends_with("Question:\nWhat is beta?"));
    }
}
