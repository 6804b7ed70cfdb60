//! Persona configuration sent with every request.
//!
//! A persona bundles the system prompt, the greeting seeded into a new
//! transcript, the model identifier and the generation parameters. It is
//! loaded once per session and never changes afterwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::builder::Backend;
use crate::error::KindlyError;
use crate::transcript::DEFAULT_GREETING;

const FRIENDLY_PROMPT: &str = include_str!("prompts/friendly.txt");
const KINDLY_PROMPT: &str = include_str!("prompts/kindly.txt");

/// Harm categories understood by provider-side safety filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ];
}

/// How aggressively a harm category is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

/// A single safety threshold applied by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Reasoning budget hint for models that support thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThinkingLevel {
    Low,
    Medium,
    High,
}

/// Static configuration of the assistant persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name shown above replies
    pub name: String,
    /// Instructional text sent as request-level system configuration
    pub system_prompt: String,
    /// First assistant entry of every new transcript
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Backend the persona was written for
    #[serde(default)]
    pub backend: Backend,
    /// Model identifier understood by the backend
    pub model: String,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Top-p sampling parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<ThinkingLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl PersonaConfig {
    /// Short, script-first coach tuned for Gemini with strict safety filters.
    pub fn friendly() -> Self {
        Self {
            name: "Friendly".to_string(),
            system_prompt: FRIENDLY_PROMPT.to_string(),
            greeting: default_greeting(),
            backend: Backend::Google,
            model: "gemini-3-pro-preview".to_string(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
            thinking_level: Some(ThinkingLevel::High),
            safety_settings: HarmCategory::ALL
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: HarmBlockThreshold::BlockLowAndAbove,
                })
                .collect(),
        }
    }

    /// Four-sentence empathetic coach tuned for the OpenAI Responses API.
    pub fn kindly() -> Self {
        Self {
            name: "Kindly".to_string(),
            system_prompt: KINDLY_PROMPT.to_string(),
            greeting: default_greeting(),
            backend: Backend::OpenAI,
            model: "gpt-5.1-mini".to_string(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
            thinking_level: None,
            safety_settings: Vec::new(),
        }
    }

    /// Loads a persona from a JSON file.
    ///
    /// Only `name`, `system_prompt` and `model` are required; everything else
    /// falls back to its default.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KindlyError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KindlyError::InvalidRequest(format!("Cannot read persona file {}: {e}", path.display()))
        })?;
        let persona: PersonaConfig = serde_json::from_str(&contents)?;
        persona.validate()?;
        log::debug!("loaded persona '{}' from {}", persona.name, path.display());
        Ok(persona)
    }

    /// Rejects configurations no provider would accept.
    pub fn validate(&self) -> Result<(), KindlyError> {
        if self.system_prompt.trim().is_empty() {
            return Err(KindlyError::InvalidRequest(
                "Persona system prompt is empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(KindlyError::InvalidRequest(
                "Persona model identifier is empty".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(KindlyError::InvalidRequest(format!(
                    "Temperature {t} is outside 0.0-2.0"
                )));
            }
        }
        Ok(())
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self::friendly()
    }
}

/// Built-in personas selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Friendly,
    Kindly,
}

impl Preset {
    pub fn config(self) -> PersonaConfig {
        match self {
            Preset::Friendly => PersonaConfig::friendly(),
            Preset::Kindly => PersonaConfig::kindly(),
        }
    }
}

impl FromStr for Preset {
    type Err = KindlyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "friendly" => Ok(Preset::Friendly),
            "kindly" => Ok(Preset::Kindly),
            _ => Err(KindlyError::InvalidRequest(format!(
                "Unknown persona preset: {s}"
            ))),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Friendly => write!(f, "friendly"),
            Preset::Kindly => write!(f, "kindly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn friendly_blocks_all_categories_at_low() {
        let persona = PersonaConfig::friendly();
        assert_eq!(persona.safety_settings.len(), 4);
        assert!(persona
            .safety_settings
            .iter()
            .all(|s| s.threshold == HarmBlockThreshold::BlockLowAndAbove));
        assert_eq!(persona.thinking_level, Some(ThinkingLevel::High));
        assert!(persona.system_prompt.contains("walk away"));
    }

    #[test]
    fn kindly_keeps_four_sentence_coach_prompt() {
        let persona = PersonaConfig::kindly();
        assert_eq!(persona.backend, Backend::OpenAI);
        assert!(persona
            .system_prompt
            .contains("tell 2 or 3 nicer or sweeter ways"));
        assert!(persona
            .system_prompt
            .contains("I'm so stupid, I failed my math test again."));
        assert!(persona
            .system_prompt
            .contains("optional boundary/exit option (still required as the fourth sentence)"));
        assert!(persona.safety_settings.is_empty());
    }

    #[test]
    fn safety_settings_use_provider_names() {
        let setting = SafetySetting {
            category: HarmCategory::DangerousContent,
            threshold: HarmBlockThreshold::BlockOnlyHigh,
        };
        let json = serde_json::to_value(setting).unwrap();
        assert_eq!(json["category"], "HARM_CATEGORY_DANGEROUS_CONTENT");
        assert_eq!(json["threshold"], "BLOCK_ONLY_HIGH");
    }

    #[test]
    fn loads_minimal_persona_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"Coach","system_prompt":"Be nice.","model":"gemini-2.5-flash","temperature":0.4}}"#
        )
        .unwrap();

        let persona = PersonaConfig::from_file(file.path()).unwrap();
        assert_eq!(persona.name, "Coach");
        assert_eq!(persona.greeting, DEFAULT_GREETING);
        assert_eq!(persona.backend, Backend::Google);
        assert_eq!(persona.temperature, Some(0.4));
        assert!(persona.safety_settings.is_empty());
    }

    #[test]
    fn rejects_blank_prompt() {
        let persona = PersonaConfig::kindly().with_system_prompt("  ");
        assert!(matches!(
            persona.validate(),
            Err(KindlyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn presets_parse_case_insensitively() {
        assert_eq!("Kindly".parse::<Preset>().unwrap(), Preset::Kindly);
        assert!("grumpy".parse::<Preset>().is_err());
    }
}
