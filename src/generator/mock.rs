/// Offline generator that reports what it was given instead of calling a model.
use super::{Generator, GeneratorError};

/// Answers with the number of context sections in the prompt, or the
/// no-context marker when there were none.
pub struct MockGenerator;

impl Generator for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        if prompt.trim().is_empty() {
            return Err(GeneratorError::EmptyPrompt);
        }
        if prompt.contains(crate::composer::NO_CONTEXT_MARKER) {
            return Ok("I don't know: no indexed context matched the question.".to_string());
        }
        let sections = prompt
            .lines()
            .filter(|l| l.starts_with("[source "))
            .count();
        Ok(format!("Answer composed from {sections} context section(s)."))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
