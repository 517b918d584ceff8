//! Question intent levels and classification
//!
//! Levels drive scheduling priority and pipeline routing:
//! - L1: simple retrieval
//! - L2: path or relationship queries
//! - L3: graph computation (ranking, centrality)
//! - L4: graph modification

use crate::errors::{RagError, Result};
use crate::services::LanguageModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Confidence reported by the keyword fallback
pub const KEYWORD_CONFIDENCE: f64 = 0.6;

const PATH_KEYWORDS: &[&str] = &["path", "connection", "link", "relation", "between"];
const COMPUTE_KEYWORDS: &[&str] = &[
    "rank",
    "calculate",
    "compute",
    "analyze",
    "most",
    "centrality",
];
const MODIFY_KEYWORDS: &[&str] = &["add", "update", "delete", "change", "modify", "create"];

/// Intent level of a user question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentLevel {
    L1,
    L2,
    L3,
    L4,
}

impl IntentLevel {
    pub const ALL: [IntentLevel; 4] = [
        IntentLevel::L1,
        IntentLevel::L2,
        IntentLevel::L3,
        IntentLevel::L4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLevel::L1 => "L1",
            IntentLevel::L2 => "L2",
            IntentLevel::L3 => "L3",
            IntentLevel::L4 => "L4",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IntentLevel::L1 => "simple retrieval",
            IntentLevel::L2 => "path query",
            IntentLevel::L3 => "graph computation",
            IntentLevel::L4 => "graph modification",
        }
    }

    /// Parse "L1".."L4" (case-insensitive)
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "L1" => Some(IntentLevel::L1),
            "L2" => Some(IntentLevel::L2),
            "L3" => Some(IntentLevel::L3),
            "L4" => Some(IntentLevel::L4),
            _ => None,
        }
    }
}

impl fmt::Display for IntentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub level: IntentLevel,
    pub confidence: f64,
    pub reasoning: String,
}

/// Source of intent verdicts
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, question: &str) -> Result<IntentClassification>;
}

/// Deterministic keyword classification, checked in L2, L3, L4 order
pub fn keyword_classification(question: &str) -> IntentClassification {
    let lower = question.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|kw| lower.contains(kw));

    let (level, reasoning) = if matches(PATH_KEYWORDS) {
        (IntentLevel::L2, "keyword match on path/connection/relation")
    } else if matches(COMPUTE_KEYWORDS) {
        (IntentLevel::L3, "keyword match on rank/calculate/compute")
    } else if matches(MODIFY_KEYWORDS) {
        (IntentLevel::L4, "keyword match on add/update/delete")
    } else {
        (IntentLevel::L1, "no keyword match, defaulting to simple retrieval")
    };

    IntentClassification {
        level,
        confidence: KEYWORD_CONFIDENCE,
        reasoning: reasoning.to_string(),
    }
}

/// Classify with `classifier`, falling back to keywords on error
pub async fn classify_or_fallback(
    classifier: Option<&dyn IntentClassifier>,
    question: &str,
) -> IntentClassification {
    let Some(classifier) = classifier else {
        return keyword_classification(question);
    };

    match classifier.classify(question).await {
        Ok(classification) => classification,
        Err(e) => {
            tracing::warn!(error = %e, "intent classifier failed, using keyword classification");
            keyword_classification(question)
        }
    }
}

/// Keyword classifier behind the trait, for callers that need a trait object
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, question: &str) -> Result<IntentClassification> {
        Ok(keyword_classification(question))
    }
}

const CLASSIFY_PROMPT: &str = "Classify the intent of the question into one level:\n\
L1: simple fact retrieval\n\
L2: path or relationship between entities\n\
L3: graph computation such as ranking or centrality\n\
L4: adding, updating or deleting graph data\n\
Reply with the level first, then a short reason.\n\nQuestion: ";

/// Classifier that asks the language model for a level
pub struct LlmIntentClassifier {
    llm: Arc<dyn LanguageModel>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, question: &str) -> Result<IntentClassification> {
        let reply = self
            .llm
            .generate(&format!("{}{}", CLASSIFY_PROMPT, question))
            .await
            .map_err(|e| RagError::Classification(e.to_string()))?;

        let level = reply
            .split(|c: char| !c.is_alphanumeric())
            .find_map(IntentLevel::parse)
            .ok_or_else(|| {
                RagError::Classification(format!("no level in reply: {}", reply.trim()))
            })?;

        Ok(IntentClassification {
            level,
            confidence: 0.9,
            reasoning: reply.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reply(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl LanguageModel for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|e| RagError::Generic(e.to_string()))
        }
    }

    #[test]
    fn test_keyword_levels() {
        assert_eq!(keyword_classification("Shortest path from A to B").level, IntentLevel::L2);
        assert_eq!(keyword_classification("Rank the most cited papers").level, IntentLevel::L3);
        assert_eq!(keyword_classification("Delete vertex Bob").level, IntentLevel::L4);
        assert_eq!(keyword_classification("Who founded Huawei?").level, IntentLevel::L1);
    }

    #[test]
    fn test_keyword_precedence_and_confidence() {
        // L2 keywords win over L4 ones
        let c = keyword_classification("Add a link between A and B");
        assert_eq!(c.level, IntentLevel::L2);
        assert_eq!(c.confidence, KEYWORD_CONFIDENCE);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(IntentLevel::parse("l3"), Some(IntentLevel::L3));
        assert_eq!(IntentLevel::parse("L5"), None);
        assert_eq!(IntentLevel::L4.to_string(), "L4");
    }

    #[tokio::test]
    async fn test_llm_classifier_parses_level() {
        let classifier = LlmIntentClassifier::new(Arc::new(Reply(Ok("L3: ranking question"))));
        let c = classifier.classify("Which node is most central?").await.unwrap();
        assert_eq!(c.level, IntentLevel::L3);
    }

    #[tokio::test]
    async fn test_fallback_on_classifier_error() {
        let classifier = LlmIntentClassifier::new(Arc::new(Reply(Err("connection refused"))));
        let c = classify_or_fallback(Some(&classifier), "Path between Alice and Bob").await;
        assert_eq!(c.level, IntentLevel::L2);
        assert_eq!(c.confidence, KEYWORD_CONFIDENCE);

        let c = classify_or_fallback(None, "Who is Alice?").await;
        assert_eq!(c.level, IntentLevel::L1);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_classification_error() {
        let classifier = LlmIntentClassifier::new(Arc::new(Reply(Ok("not sure"))));
        let err = classifier.classify("?").await.unwrap_err();
        assert!(matches!(err, RagError::Classification(_)));
    }
}
