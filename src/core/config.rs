//! Engine configuration.
//!
//! Typed config sections with defaults tuned for small local models, a
//! `validate()` pass that rejects incoherent values before any work starts,
//! and YAML loading for file-based deployments.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Chunk splitting parameters (characters).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    pub target_size: usize,
    /// Overlap carried from the end of one chunk into the next.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.target_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunking.target_size must be at least 1".to_string(),
            ));
        }
        if self.overlap >= self.target_size {
            return Err(RagError::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.overlap, self.target_size
            )));
        }
        Ok(())
    }
}

/// Retrieval and re-ranking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the orchestrator.
    pub top_k: usize,
    /// Minimum cosine similarity for a hit to count as grounding.
    pub min_score: f32,
    /// Cap on chunks retained per document after ranking.
    pub max_per_document: usize,
    /// Oversampling factor applied to the index query before re-ranking,
    /// so the per-document cap does not starve `top_k`.
    pub oversample: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.25,
            max_per_document: 2,
            oversample: 4,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.max_per_document == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.max_per_document must be at least 1".to_string(),
            ));
        }
        if self.oversample == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.oversample must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(RagError::InvalidConfig(format!(
                "retrieval.min_score ({}) must lie in [-1, 1]",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// Prompt assembly budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Instruction preamble placed at the top of every prompt.
    pub preamble: String,
    /// Token budget for conversation history (estimated, oldest dropped first).
    pub history_token_budget: usize,
    /// Maximum characters of grounding excerpts included in the prompt.
    pub max_context_chars: usize,
    /// How many recent turns to fetch from the store before budget fitting.
    pub max_history_turns: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: "You are a helpful assistant. Answer using the supplied excerpts \
                       where possible and cite them by their [n] label."
                .to_string(),
            history_token_budget: 1500,
            max_context_chars: 6000,
            max_history_turns: 20,
        }
    }
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.max_context_chars == 0 {
            return Err(RagError::InvalidConfig(
                "prompt.max_context_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Retries after the first attempt before the error is surfaced.
    pub max_retries: usize,
    /// Initial backoff; doubled on each retry.
    pub retry_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

/// Root configuration for [`RagEngine`](crate::engine::RagEngine).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.prompt.validate()?;
        Ok(())
    }

    /// Parse a YAML config string. Missing sections fall back to defaults.
    pub fn from_yaml(contents: &str) -> Result<Self, RagError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| RagError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RagError::InvalidConfig(format!(
                "failed to read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_target() {
        let config = ChunkingConfig {
            target_size: 100,
            overlap: 100,
        };
        assert!(matches!(
            config.validate(),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_top_k_rejected() {
        let config = RetrievalConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_roundtrip_with_partial_sections() {
        let yaml = r#"
chunking:
  target_size: 300
  overlap: 30
retrieval:
  top_k: 3
"#;
        let config = RagConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.chunking.target_size, 300);
        assert_eq!(config.retrieval.top_k, 3);
        // untouched sections keep defaults
        assert_eq!(config.generation.max_retries, 2);
    }

    #[test]
    fn invalid_yaml_values_rejected() {
        let yaml = "chunking:\n  target_size: 10\n  overlap: 50\n";
        assert!(RagConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = RagConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.chunking.target_size, 500);
    }
}
