use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::extractor::FAILURE_SENTINEL;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    pub instructions: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequestConfig {
    /// Prefixed to the current buffer content in the digest message.
    pub digest_preamble: String,
    /// Opening context sentence of the composed instruction prompt.
    pub prep_prompt: String,
    /// Answer-shape instructions: code only, no markdown, sentinel contract.
    pub post_prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system: SystemConfig,
    pub request: RequestConfig,
}

impl PromptsConfig {
    pub fn load() -> Result<Self> {
        // Try to load from current directory first, then from executable directory
        let config_paths = [
            "prompts.toml",
            "./prompts.toml",
            "../prompts.toml", // In case running from target/debug
        ];

        for path in &config_paths {
            if let Ok(content) = fs::read_to_string(path) {
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse prompts.toml from {}", path));
            }
        }

        // If no config file found, return default configuration
        Ok(Self::default())
    }

    pub fn get_system_instructions(&self) -> &str {
        &self.system.instructions
    }

    /// The "digest this buffer" message sent before the actual request.
    pub fn build_digest_prompt(&self, buffer_text: &str) -> String {
        format!("{}\n{}", self.request.digest_preamble, buffer_text)
    }

    /// The composed instruction prompt wrapping the user's free text.
    pub fn build_full_prompt(&self, user_text: &str) -> String {
        format!(
            "Initial context: {}\nInstructions on your answer: {}\nThe question is: {}",
            self.request.prep_prompt, self.request.post_prompt, user_text
        )
    }
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig {
                instructions: "You are a senior software engineer who has mastered Java, Rust, \
                               Python, Go, and JavaScript. You know exactly how to solve coding \
                               challenges in those languages and you always reply with \
                               professional-grade source code. You always reply by providing \
                               the source code and nothing else."
                    .to_string(),
            },
            request: RequestConfig {
                digest_preamble: "Digest this source code even if it is empty; just reply OK"
                    .to_string(),
                prep_prompt: "I am a software developer in Java, Rust, Python, Go and \
                              JavaScript and you are a powerful AI assistant that acts as a \
                              software engineer."
                    .to_string(),
                post_prompt: format!(
                    "answer must contain only source code; your answer cannot contain \
                     explanations of any sort; always provide full source code and not just \
                     snippets; if you cannot answer with source code, reply with exactly {}",
                    FAILURE_SENTINEL
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_prompt_contains_all_parts() {
        let prompts = PromptsConfig::default();
        let full = prompts.build_full_prompt("swap two strings in python");
        assert!(full.starts_with("Initial context:"));
        assert!(full.contains("Instructions on your answer:"));
        assert!(full.ends_with("The question is: swap two strings in python"));
    }

    #[test]
    fn test_digest_prompt_embeds_buffer() {
        let prompts = PromptsConfig::default();
        let digest = prompts.build_digest_prompt("a = 1");
        assert!(digest.starts_with(&prompts.request.digest_preamble));
        assert!(digest.ends_with("a = 1"));
    }

    #[test]
    fn test_post_prompt_declares_sentinel() {
        let prompts = PromptsConfig::default();
        assert!(prompts.request.post_prompt.contains(FAILURE_SENTINEL));
    }
}
