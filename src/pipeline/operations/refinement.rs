//! Answer synthesis and its template fallback

use crate::errors::OperationError;
use crate::pipeline::context::{ExecutionContext, ANSWER_PROMPT_KEY, MEMORY_KEY, QUERY_KEY};
use crate::pipeline::operation::{Operation, OperationResult};
use crate::pipeline::operations::{
    render_template, retrieved_knowledge, RESULT_REFINEMENT, TEMPLATE_ANSWER,
};
use crate::services::{ServiceRegistry, FALLBACK_MODEL, LLM_SERVICE};
use async_trait::async_trait;
use serde_json::json;

/// Label reported by the template fallback when no model label is registered
pub const TEMPLATE_MODEL: &str = "template";

/// Knowledge lines passed to the template answer
const TEMPLATE_LINES: usize = 5;

const DEFAULT_ANSWER_PROMPT: &str = "Answer the question using only the context \
below. If the context is not sufficient, say so.\n\n\
---------------------\n{context}\n---------------------\n\
{memory}Question: {question}\nAnswer:";

fn question_of(context: &ExecutionContext) -> Result<&str, OperationError> {
    context
        .query()
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| OperationError::missing_input(QUERY_KEY))
}

/// LLM answer grounded on everything retrieved so far
#[derive(Debug, Default)]
pub struct ResultRefinement;

#[async_trait]
impl Operation for ResultRefinement {
    fn name(&self) -> &str {
        RESULT_REFINEMENT
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![LLM_SERVICE]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let question = question_of(context)?;
        let llm = services.llm(LLM_SERVICE)?;

        let knowledge = retrieved_knowledge(context).join("\n");
        let template = context
            .get_str(ANSWER_PROMPT_KEY)
            .unwrap_or(DEFAULT_ANSWER_PROMPT);
        let memory = context
            .get_str(MEMORY_KEY)
            .filter(|m| !m.trim().is_empty())
            .map(|m| format!("Conversation so far:\n{}\n\n", m))
            .unwrap_or_default();
        let prompt = render_template(
            template,
            &[
                ("context", knowledge.as_str()),
                ("memory", memory.as_str()),
                ("question", question),
            ],
        );

        let answer = llm.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(OperationError::new("model returned an empty answer"));
        }

        Ok(json!({ "answer": answer.trim(), "model": LLM_SERVICE }))
    }
}

/// Answer assembled from retrieved knowledge without calling the model
#[derive(Debug, Default)]
pub struct TemplateAnswer;

#[async_trait]
impl Operation for TemplateAnswer {
    fn name(&self) -> &str {
        TEMPLATE_ANSWER
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let question = question_of(context)?;
        let model = services.setting(FALLBACK_MODEL).unwrap_or(TEMPLATE_MODEL);

        let knowledge = retrieved_knowledge(context);
        let answer = if knowledge.is_empty() {
            format!("No relevant information found for: {}", question)
        } else {
            let lines = knowledge
                .iter()
                .take(TEMPLATE_LINES)
                .map(|line| format!("- {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Relevant information for \"{}\":\n{}", question, lines)
        };

        Ok(json!({ "answer": answer, "model": model }))
    }
}
