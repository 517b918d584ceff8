//! Execution context threaded through one pipeline run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Suffix appended to a step name to form its output key
pub const RESULT_SUFFIX: &str = "_result";

/// Well-known input keys
pub const QUERY_KEY: &str = "query";
pub const ANSWER_PROMPT_KEY: &str = "answer_prompt";
pub const KEYWORDS_PROMPT_KEY: &str = "keywords_prompt";
pub const MEMORY_KEY: &str = "memory";

/// Key-value state owned by a single execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with the user question
    pub fn for_query(query: impl Into<String>) -> Self {
        let mut context = Self::new();
        context.insert(QUERY_KEY, Value::String(query.into()));
        context
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The user question, if present
    pub fn query(&self) -> Option<&str> {
        self.get_str(QUERY_KEY)
    }

    /// Output written by the operation named `operation`
    pub fn result_of(&self, operation: &str) -> Option<&Value> {
        self.values.get(&result_key(operation))
    }

    /// First present output among `operations`, in order
    pub fn first_result_of(&self, operations: &[&str]) -> Option<&Value> {
        operations.iter().find_map(|op| self.result_of(op))
    }

    /// Store an operation's output under `<operation>_result`
    pub fn set_result(&mut self, operation: &str, value: Value) {
        self.values.insert(result_key(operation), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values.into_iter().collect())
    }
}

/// `"<operation>_result"`
pub fn result_key(operation: &str) -> String {
    format!("{}{}", operation, RESULT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_query() {
        let ctx = ExecutionContext::for_query("Who founded Huawei?");
        assert_eq!(ctx.query(), Some("Who founded Huawei?"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_result_keys() {
        let mut ctx = ExecutionContext::new();
        ctx.set_result("GraphQuery", json!(["v1"]));

        assert!(ctx.contains("GraphQuery_result"));
        assert_eq!(ctx.result_of("GraphQuery"), Some(&json!(["v1"])));
        assert_eq!(
            ctx.first_result_of(&["VertexLookup", "GraphQuery"]),
            Some(&json!(["v1"]))
        );
    }

    #[test]
    fn test_into_value() {
        let ctx = ExecutionContext::new().with("a", 1).with("b", "two");
        let value = ctx.into_value();
        assert_eq!(value["a"], json!(1));
        assert_eq!(value["b"], json!("two"));
    }
}
