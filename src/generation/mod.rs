// Generation collaborator: (query, context) → answer

pub mod ollama;

use async_trait::async_trait;

use crate::errors::Result;

/// Context text handed to the generator when nothing was authorized
pub const NO_ACCESSIBLE_CONTEXT: &str =
    "No documents accessible to your role contain information relevant to this question.";

/// Produces an answer from a question and an authorized context.
/// Failures surface as `RagError::Generation` and are not retried here.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str, context: &str) -> Result<String>;
}

/// Prompt instructing the model to stay within the supplied context
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You are an internal company assistant. Answer using ONLY the context below.
If the context does not contain the answer, say that the information is not available
in the documents you have access to. Do not use outside knowledge.
Cite sources only from the "Source:" lines present in the context.

Context:
{}

Question: {}

Answer:"#,
        context, query
    )
}

pub use ollama::OllamaGenerator;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_contains_parts() {
        let prompt = build_prompt("What is the leave policy?", "[1] Source: general/handbook.md\n...");
        assert!(prompt.contains("What is the leave policy?"));
        assert!(prompt.contains("general/handbook.md"));
        assert!(prompt.contains("ONLY the context"));
    }
}
