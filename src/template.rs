//! Prompt template catalogue
//!
//! LlamaEdge apps take the chat template name via `-p` and an optional stop
//! string via `-r`. The catalogue below pairs every template with the stop
//! string its model family conventionally emits.

use crate::error::{RunnerError, RunnerResult};
use std::fmt;
use std::str::FromStr;

/// A named prompt template understood by the LlamaEdge apps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub reverse_prompt: Option<&'static str>,
}

impl PromptTemplate {
    const fn new(name: &'static str, reverse_prompt: Option<&'static str>) -> Self {
        Self {
            name,
            reverse_prompt,
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for PromptTemplate {
    type Err = RunnerError;

    fn from_str(s: &str) -> RunnerResult<Self> {
        let wanted = s.trim();
        CATALOGUE
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| RunnerError::InvalidInput(format!("unknown prompt template: {wanted}")))
    }
}

pub const CATALOGUE: &[PromptTemplate] = &[
    PromptTemplate::new("llama-2-chat", None),
    PromptTemplate::new("llama-3-chat", None),
    PromptTemplate::new("codellama-instruct", None),
    PromptTemplate::new("mistral-instruct", None),
    PromptTemplate::new("mistrallite", None),
    PromptTemplate::new("openchat", Some("<|end_of_turn|>")),
    PromptTemplate::new("chatml", Some("<|im_end|>")),
    PromptTemplate::new("baichuan-2", Some("用户:")),
    PromptTemplate::new("zephyr", Some("</s>")),
    PromptTemplate::new("stablelm-zephyr", None),
    PromptTemplate::new("intel-neural", None),
    PromptTemplate::new("deepseek-chat", None),
    PromptTemplate::new("deepseek-coder", None),
    PromptTemplate::new("solar-instruct", None),
    PromptTemplate::new("gemma-instruct", Some("<end_of_turn>")),
    PromptTemplate::new("phi-2-chat", None),
    PromptTemplate::new("phi-3-chat", Some("<|end|>")),
    PromptTemplate::new("vicuna-1.0-chat", None),
    PromptTemplate::new("vicuna-1.1-chat", None),
    PromptTemplate::new("wizard-coder", None),
    PromptTemplate::new("human-assistant", None),
    PromptTemplate::new("belle-llama-2-chat", None),
    PromptTemplate::new("qwen2-vision", Some("<|im_end|>")),
];

/// Model-family substrings, checked in order against the lowercased file name
const FAMILY_HINTS: &[(&str, &str)] = &[
    ("codellama", "codellama-instruct"),
    ("belle", "belle-llama-2-chat"),
    ("llama-3", "llama-3-chat"),
    ("llama3", "llama-3-chat"),
    ("llama-2", "llama-2-chat"),
    ("mistrallite", "mistrallite"),
    ("mistral", "mistral-instruct"),
    ("mixtral", "mistral-instruct"),
    ("openchat", "openchat"),
    ("baichuan", "baichuan-2"),
    ("stablelm", "stablelm-zephyr"),
    ("zephyr", "zephyr"),
    ("neural-chat", "intel-neural"),
    ("deepseek-coder", "deepseek-coder"),
    ("deepseek", "deepseek-chat"),
    ("solar", "solar-instruct"),
    ("gemma", "gemma-instruct"),
    ("phi-3", "phi-3-chat"),
    ("phi-2", "phi-2-chat"),
    ("wizardcoder", "wizard-coder"),
    ("vicuna", "vicuna-1.1-chat"),
    ("qwen2-vl", "qwen2-vision"),
    ("qwen", "chatml"),
    ("yi-", "chatml"),
    ("hermes", "chatml"),
    ("tinyllama", "chatml"),
];

/// Guess a template from a weights file name
pub fn guess(file_name: &str) -> Option<PromptTemplate> {
    let lower = file_name.to_lowercase();
    FAMILY_HINTS
        .iter()
        .find(|(hint, _)| lower.contains(hint))
        .and_then(|(_, name)| name.parse().ok())
}

/// Position of a template in [`CATALOGUE`]
pub fn position(template: &PromptTemplate) -> usize {
    CATALOGUE
        .iter()
        .position(|t| t.name == template.name)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_template() {
        let t: PromptTemplate = "ChatML".parse().unwrap();
        assert_eq!(t.name, "chatml");
        assert_eq!(t.reverse_prompt, Some("<|im_end|>"));
    }

    #[test]
    fn test_parse_unknown_template() {
        assert!("alpaca".parse::<PromptTemplate>().is_err());
    }

    #[test]
    fn test_guess_from_file_name() {
        assert_eq!(
            guess("llama-2-7b-chat.Q5_K_M.gguf").map(|t| t.name),
            Some("llama-2-chat")
        );
        assert_eq!(
            guess("codellama-13b-instruct.Q4_0.gguf").map(|t| t.name),
            Some("codellama-instruct")
        );
        assert_eq!(
            guess("Mistral-7B-Instruct-v0.2-Q5_K_M.gguf").map(|t| t.name),
            Some("mistral-instruct")
        );
        assert_eq!(
            guess("Qwen1.5-7B-Chat-Q5_K_M.gguf").map(|t| t.name),
            Some("chatml")
        );
        assert_eq!(guess("unknown-model.gguf"), None);
    }

    #[test]
    fn test_catalogue_names_unique() {
        let mut names: Vec<_> = CATALOGUE.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATALOGUE.len());
    }

    #[test]
    fn test_every_hint_resolves() {
        for (_, name) in FAMILY_HINTS {
            assert!(name.parse::<PromptTemplate>().is_ok(), "{name}");
        }
    }
}
