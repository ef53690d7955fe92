//! Prompt assembly

/// Builds the generation prompt for one turn
///
/// The transcript is the prompt; an optional system preamble is prepended
/// when configured.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Assemble the prompt for a recognized transcript
    pub fn build(&self, transcript: &str) -> String {
        match &self.system {
            Some(system) => format!("{}\n\n{}", system, transcript),
            None => transcript.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_prompt() {
        let builder = PromptBuilder::new();
        assert_eq!(builder.build("what time is it"), "what time is it");
    }

    #[test]
    fn test_system_preamble() {
        let builder = PromptBuilder::new().with_system("Answer briefly.");
        assert_eq!(
            builder.build("what time is it"),
            "Answer briefly.\n\nwhat time is it"
        );
    }
}
