//! Supported completion models.

use crate::error::Error;
use serde::Serialize;
use std::str::FromStr;

/// A model this library knows the context window and price of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Model {
    /// `gpt-3.5-turbo` (also accepted as `gpt-3.5`)
    Gpt35Turbo,
    /// `gpt-4`
    Gpt4,
    /// `gpt-4-1106-preview`
    Gpt4TurboPreview,
}

impl Model {
    /// Canonical identifier sent to the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt35Turbo => "gpt-3.5-turbo",
            Self::Gpt4 => "gpt-4",
            Self::Gpt4TurboPreview => "gpt-4-1106-preview",
        }
    }

    /// Maximum input + output tokens the model accepts.
    pub fn context_window(&self) -> usize {
        match self {
            Self::Gpt35Turbo => 4096,
            Self::Gpt4 | Self::Gpt4TurboPreview => 8192,
        }
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt-3.5-turbo" | "gpt-3.5" => Ok(Self::Gpt35Turbo),
            "gpt-4" => Ok(Self::Gpt4),
            "gpt-4-1106-preview" => Ok(Self::Gpt4TurboPreview),
            other => Err(Error::UnsupportedModel(other.to_string())),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_models() {
        assert_eq!("gpt-3.5-turbo".parse::<Model>().unwrap(), Model::Gpt35Turbo);
        assert_eq!("gpt-3.5".parse::<Model>().unwrap(), Model::Gpt35Turbo);
        assert_eq!("gpt-4".parse::<Model>().unwrap(), Model::Gpt4);
        assert_eq!(
            "gpt-4-1106-preview".parse::<Model>().unwrap(),
            Model::Gpt4TurboPreview
        );
    }

    #[test]
    fn context_windows() {
        assert_eq!(Model::Gpt35Turbo.context_window(), 4096);
        assert_eq!(Model::Gpt4.context_window(), 8192);
    }

    #[test]
    fn unknown_model_rejected() {
        let err = "claude-2".parse::<Model>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel(ref m) if m == "claude-2"));
    }

    #[test]
    fn alias_normalizes_to_canonical_name() {
        let model: Model = "gpt-3.5".parse().unwrap();
        assert_eq!(model.to_string(), "gpt-3.5-turbo");
    }
}
