//! Settings and model selection state

use crate::error::{Error, Result};
use parley_api::models::DEFAULT_MODEL;
use parley_api::{ConversationSnapshot, ModelCatalog, ModelFilter, ModelInfo, ModelType};
use serde::{Deserialize, Serialize};

/// Models that only run at temperature 1
pub const FIXED_TEMPERATURE_MODELS: &[&str] = &["o1-preview", "o1-mini"];

/// Models that take no system message
pub const FIXED_INSTRUCTION_MODELS: &[&str] = &["o1-preview", "o1-mini"];

pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const FIXED_TEMPERATURE: f32 = 1.0;

/// Highest reasoning effort level
pub const MAX_REASON: u8 = 3;

const SEARCH_MODEL: &str = "sonar";
const SEARCH_INFERENCE_MODEL: &str = "sonar-reasoning";
const INFERENCE_MODEL: &str = "o1";

/// Parse a reasoning level from `0-3` or `low|medium|high`
pub fn parse_reason(input: &str) -> Option<u8> {
    match input.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "0" => Some(0),
        "low" | "1" => Some(1),
        "medium" | "2" => Some(2),
        "high" | "3" => Some(3),
        _ => None,
    }
}

/// Display label of a reasoning level
pub fn reason_label(level: u8) -> &'static str {
    match level {
        1 => "low",
        2 => "medium",
        3 => "high",
        _ => "off",
    }
}

/// Per-conversation request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model: String,
    pub model_type: ModelType,
    pub temperature: f32,
    /// 0 = unset, 1-3 = low/medium/high
    pub reason: u8,
    pub system_message: String,
    pub is_search: bool,
    pub is_inference: bool,
    pub is_dan: bool,
    /// An image attachment is pending
    pub is_image: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            model_type: ModelType::Default,
            temperature: DEFAULT_TEMPERATURE,
            reason: 0,
            system_message: String::new(),
            is_search: false,
            is_inference: false,
            is_dan: false,
            is_image: false,
        }
    }
}

impl Settings {
    /// Whether the current model pins the temperature
    pub fn is_temperature_locked(&self) -> bool {
        FIXED_TEMPERATURE_MODELS.contains(&self.model.as_str())
            || self.model_type != ModelType::Default
    }

    /// Whether the current model takes no system message
    pub fn is_instruction_locked(&self) -> bool {
        FIXED_INSTRUCTION_MODELS.contains(&self.model.as_str())
    }

    /// Catalog entry of the current model
    pub fn model_info<'a>(&self, catalog: &'a ModelCatalog) -> Result<&'a ModelInfo> {
        Ok(catalog.require(&self.model)?)
    }

    /// Switch model and reset the settings that depend on it
    pub fn select_model(&mut self, model: &ModelInfo) {
        tracing::debug!("Selecting model {}", model.model_name);
        self.model = model.model_name.clone();
        self.model_type = model.model_type;
        self.temperature = if FIXED_TEMPERATURE_MODELS.contains(&model.model_name.as_str()) {
            FIXED_TEMPERATURE
        } else {
            DEFAULT_TEMPERATURE
        };
        if FIXED_INSTRUCTION_MODELS.contains(&model.model_name.as_str()) {
            self.system_message.clear();
        }
        if model.model_type != ModelType::Reason {
            self.reason = 0;
        }
        if model.model_type == ModelType::None {
            self.is_dan = false;
        }
    }

    /// Switch to a model by name
    pub fn set_model(&mut self, catalog: &ModelCatalog, name: &str) -> Result<()> {
        let model = catalog.require(name)?;
        if self.is_image && !model.supports_image() {
            return Err(Error::Setting(format!(
                "{} does not accept images; detach them first",
                model.model_alias
            )));
        }
        self.select_model(model);
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(Error::Setting(format!(
                "temperature must be between 0 and 1, got {}",
                temperature
            )));
        }
        if self.is_temperature_locked() {
            return Err(Error::Setting(format!(
                "{} does not allow changing the temperature",
                self.model
            )));
        }
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_reason(&mut self, level: u8) -> Result<()> {
        if level > MAX_REASON {
            return Err(Error::Setting(format!(
                "reasoning level must be 0-{}, got {}",
                MAX_REASON, level
            )));
        }
        if level != 0 && self.model_type != ModelType::Reason {
            return Err(Error::Setting(format!(
                "{} has no reasoning level",
                self.model
            )));
        }
        self.reason = level;
        Ok(())
    }

    pub fn set_system_message(&mut self, message: impl Into<String>) -> Result<()> {
        if self.is_instruction_locked() {
            return Err(Error::Setting(format!(
                "{} does not take a system message",
                self.model
            )));
        }
        self.system_message = message.into();
        Ok(())
    }

    /// Flip web search and switch to the matching model
    pub fn toggle_search(&mut self, catalog: &ModelCatalog) -> Result<()> {
        self.apply_toggles(catalog, !self.is_search, self.is_inference)
    }

    /// Flip reasoning mode and switch to the matching model
    pub fn toggle_inference(&mut self, catalog: &ModelCatalog) -> Result<()> {
        self.apply_toggles(catalog, self.is_search, !self.is_inference)
    }

    fn apply_toggles(&mut self, catalog: &ModelCatalog, search: bool, inference: bool) -> Result<()> {
        let target = match (search, inference) {
            (true, true) => SEARCH_INFERENCE_MODEL,
            (true, false) => SEARCH_MODEL,
            (false, true) => INFERENCE_MODEL,
            (false, false) => DEFAULT_MODEL,
        };
        let model = catalog.require(target)?;
        self.is_search = search;
        self.is_inference = inference;
        self.select_model(model);
        Ok(())
    }

    /// Flip DAN mode; unavailable for models without settings controls
    pub fn toggle_dan(&mut self) -> Result<bool> {
        if self.model_type == ModelType::None {
            return Err(Error::Setting(format!("{} does not support DAN mode", self.model)));
        }
        self.is_dan = !self.is_dan;
        Ok(self.is_dan)
    }

    /// Track whether an image is pending. Forces an image-capable model;
    /// returns true when the model had to change.
    pub fn set_image_pending(&mut self, pending: bool, catalog: &ModelCatalog) -> bool {
        self.is_image = pending;
        if !pending {
            return false;
        }
        let capable = catalog
            .get(&self.model)
            .map(|m| m.supports_image())
            .unwrap_or(false);
        if capable {
            return false;
        }
        match catalog.get(DEFAULT_MODEL) {
            Some(fallback) => {
                tracing::info!("{} cannot read images, switching to {}", self.model, DEFAULT_MODEL);
                self.select_model(fallback);
                true
            }
            None => false,
        }
    }

    /// Adopt the settings stored with a fetched conversation
    pub fn apply_snapshot(&mut self, snapshot: &ConversationSnapshot, catalog: &ModelCatalog) {
        self.is_search = false;
        self.is_inference = false;
        self.is_dan = false;
        match catalog.get(&snapshot.model) {
            Some(model) => self.select_model(model),
            None => {
                tracing::warn!("Conversation uses unknown model {}", snapshot.model);
                self.model = snapshot.model.clone();
                self.model_type = ModelType::Default;
            }
        }
        self.temperature = snapshot.temperature;
        self.reason = snapshot.reason.min(MAX_REASON);
        self.system_message = snapshot.system_message.clone();
    }

    /// Filter for the model list under the current toggles
    pub fn model_filter(&self) -> ModelFilter {
        ModelFilter {
            search: self.is_search,
            inference: self.is_inference,
            image: self.is_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog::builtin()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.model, "gpt-4o");
        assert_eq!(s.temperature, 0.5);
        assert_eq!(s.reason, 0);
        assert!(!s.is_search && !s.is_inference && !s.is_dan && !s.is_image);
    }

    #[test]
    fn test_fixed_temperature_model() {
        let c = catalog();
        let mut s = Settings::default();
        s.set_system_message("be brief").unwrap();
        s.set_model(&c, "o1-mini").unwrap();
        assert_eq!(s.temperature, 1.0);
        assert!(s.system_message.is_empty());
        assert!(s.set_temperature(0.2).is_err());
        assert!(s.set_system_message("x").is_err());

        s.set_model(&c, "gpt-4o-mini").unwrap();
        assert_eq!(s.temperature, 0.5);
        s.set_temperature(0.2).unwrap();
        assert_eq!(s.temperature, 0.2);
    }

    #[test]
    fn test_temperature_range() {
        let mut s = Settings::default();
        assert!(s.set_temperature(1.5).is_err());
        assert!(s.set_temperature(-0.1).is_err());
        assert!(s.set_temperature(f32::NAN).is_err());
        assert_eq!(s.temperature, 0.5);
    }

    #[test]
    fn test_reason_requires_reason_model() {
        let c = catalog();
        let mut s = Settings::default();
        assert!(s.set_reason(2).is_err());
        s.set_model(&c, "o3-mini").unwrap();
        s.set_reason(2).unwrap();
        assert!(s.set_reason(4).is_err());
        s.set_model(&c, "gpt-4o").unwrap();
        assert_eq!(s.reason, 0);
    }

    #[test]
    fn test_toggles_pick_model() {
        let c = catalog();
        let mut s = Settings::default();
        s.toggle_search(&c).unwrap();
        assert_eq!(s.model, "sonar");
        s.toggle_inference(&c).unwrap();
        assert_eq!(s.model, "sonar-reasoning");
        s.toggle_search(&c).unwrap();
        assert_eq!(s.model, "o1");
        s.toggle_inference(&c).unwrap();
        assert_eq!(s.model, "gpt-4o");
        assert_eq!(s.model_filter(), ModelFilter::default());
    }

    #[test]
    fn test_toggle_with_missing_target_is_rejected() {
        let mut c = catalog();
        c.models.retain(|m| m.model_name != "sonar");
        let mut s = Settings::default();
        assert!(s.toggle_search(&c).is_err());
        assert!(!s.is_search);
        assert_eq!(s.model, "gpt-4o");
    }

    #[test]
    fn test_dan_needs_model_type() {
        let c = catalog();
        let mut s = Settings::default();
        assert!(s.toggle_dan().unwrap());
        s.set_model(&c, "o1-preview").unwrap();
        assert!(!s.is_dan);
        assert!(s.toggle_dan().is_err());
    }

    #[test]
    fn test_image_forces_capable_model() {
        let c = catalog();
        let mut s = Settings::default();
        s.set_model(&c, "deepseek-chat").unwrap();
        assert!(s.set_image_pending(true, &c));
        assert_eq!(s.model, "gpt-4o");
        assert!(s.set_model(&c, "deepseek-chat").is_err());
        assert!(!s.set_image_pending(false, &c));
        s.set_model(&c, "deepseek-chat").unwrap();
    }

    #[test]
    fn test_apply_snapshot() {
        let c = catalog();
        let mut s = Settings::default();
        s.toggle_search(&c).unwrap();
        let snapshot = ConversationSnapshot {
            conversation_id: "c".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.9,
            reason: 0,
            system_message: "terse".into(),
            messages: vec![],
        };
        s.apply_snapshot(&snapshot, &c);
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.temperature, 0.9);
        assert_eq!(s.system_message, "terse");
        assert!(!s.is_search);
    }

    #[test]
    fn test_parse_reason() {
        assert_eq!(parse_reason("HIGH"), Some(3));
        assert_eq!(parse_reason("1"), Some(1));
        assert_eq!(parse_reason("max"), None);
        assert_eq!(reason_label(2), "medium");
    }
}
