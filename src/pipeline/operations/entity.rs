//! Entity recognition and its keyword fallback

use crate::errors::OperationError;
use crate::pipeline::context::{ExecutionContext, KEYWORDS_PROMPT_KEY, QUERY_KEY};
use crate::pipeline::operation::{Operation, OperationResult};
use crate::pipeline::operations::{render_template, ENTITY_RECOGNITION, KEYWORD_EXTRACTION};
use crate::services::{ServiceRegistry, LLM_SERVICE};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

/// Upper bound on extracted entities
pub const MAX_ENTITIES: usize = 8;

const DEFAULT_KEYWORDS_PROMPT: &str = "Extract the key entities (names, places, \
organizations, concepts) from the question below. Reply with a comma separated \
list only.\n\nQuestion: {question}\nKEYWORDS:";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "did", "do", "does", "for", "from",
    "has", "have", "how", "i", "in", "into", "is", "it", "its", "me", "of", "on", "or", "please",
    "show", "tell", "that", "the", "their", "there", "this", "to", "was", "were", "what", "when",
    "where", "which", "who", "whom", "why", "will", "with", "you",
];

/// Lowercased, stop-word-filtered, de-duplicated tokens of `text`
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() > 1 && !STOP_WORDS.contains(&token.as_str()))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Parse an LLM entity reply: a JSON array or a comma/newline separated list
pub fn parse_entity_list(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return items
            .iter()
            .filter_map(|item| item.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .take(MAX_ENTITIES)
            .collect();
    }

    let body = trimmed
        .strip_prefix("KEYWORDS:")
        .unwrap_or(trimmed);

    let mut seen = HashSet::new();
    body.split(|c: char| c == ',' || c == '\n' || c == ';')
        .map(|s| {
            s.trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '-' || c == '*')
                .trim()
        })
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_ENTITIES)
        .collect()
}

fn query_of(context: &ExecutionContext) -> Result<&str, OperationError> {
    context
        .query()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| OperationError::missing_input(QUERY_KEY))
}

/// LLM-backed entity extraction
#[derive(Debug, Default)]
pub struct EntityRecognition;

#[async_trait]
impl Operation for EntityRecognition {
    fn name(&self) -> &str {
        ENTITY_RECOGNITION
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![LLM_SERVICE]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let query = query_of(context)?;
        let llm = services.llm(LLM_SERVICE)?;

        let template = context
            .get_str(KEYWORDS_PROMPT_KEY)
            .unwrap_or(DEFAULT_KEYWORDS_PROMPT);
        let prompt = render_template(template, &[("question", query)]);

        let reply = llm.generate(&prompt).await?;
        let entities = parse_entity_list(&reply);
        if entities.is_empty() {
            return Err(OperationError::new("no entities extracted"));
        }

        Ok(Value::from(entities))
    }
}

/// Keyword tokens of the question, no model involved
#[derive(Debug, Default)]
pub struct KeywordExtraction;

#[async_trait]
impl Operation for KeywordExtraction {
    fn name(&self) -> &str {
        KEYWORD_EXTRACTION
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        _services: &ServiceRegistry,
    ) -> OperationResult {
        let query = query_of(context)?;
        let keywords: Vec<String> = extract_keywords(query)
            .into_iter()
            .take(MAX_ENTITIES)
            .collect();
        if keywords.is_empty() {
            return Err(OperationError::new("question has no usable keywords"));
        }
        Ok(Value::from(keywords))
    }
}
