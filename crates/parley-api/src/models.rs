//! Model catalog with public lookup API.
//!
//! A built-in table covers the backend's stock endpoints. A JSON file of the
//! form `{"models": [...]}` can replace it when the deployment differs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which settings controls a model supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// No reasoning level, no DAN
    None,
    /// Regular chat model
    #[default]
    Default,
    /// Accepts a reasoning effort level
    Reason,
}

/// Input and tool capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub image: bool,
    #[serde(default)]
    pub search: bool,
}

/// A selectable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier sent to the backend
    pub model_name: String,
    /// Human readable name
    pub model_alias: String,
    /// Streaming endpoint path, e.g. `/gpt`
    pub endpoint: String,
    /// Input price per million tokens
    pub in_billing: f64,
    /// Output price per million tokens
    pub out_billing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_billing: Option<f64>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub model_type: ModelType,
    /// Produces visible reasoning before answering
    #[serde(default)]
    pub inference: bool,
    #[serde(default)]
    pub capabilities: Capabilities,
}

fn default_stream() -> bool {
    true
}

impl ModelInfo {
    /// Whether the model accepts image input
    pub fn supports_image(&self) -> bool {
        self.capabilities.image
    }

    /// Whether the model can search the web
    pub fn supports_search(&self) -> bool {
        self.capabilities.search
    }
}

struct ModelEntry {
    name: &'static str,
    alias: &'static str,
    endpoint: &'static str,
    in_billing: f64,
    out_billing: f64,
    search_billing: Option<f64>,
    model_type: ModelType,
    inference: bool,
    image: bool,
    search: bool,
}

impl ModelEntry {
    fn to_model(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.name.to_string(),
            model_alias: self.alias.to_string(),
            endpoint: self.endpoint.to_string(),
            in_billing: self.in_billing,
            out_billing: self.out_billing,
            search_billing: self.search_billing,
            stream: true,
            model_type: self.model_type,
            inference: self.inference,
            capabilities: Capabilities {
                image: self.image,
                search: self.search,
            },
        }
    }
}

macro_rules! entry {
    ($name:literal, $alias:literal, $endpoint:literal, $in:literal, $out:literal,
     $search:expr, $ty:ident, inference: $inf:literal, image: $img:literal, search: $s:literal) => {
        ModelEntry {
            name: $name,
            alias: $alias,
            endpoint: $endpoint,
            in_billing: $in,
            out_billing: $out,
            search_billing: $search,
            model_type: ModelType::$ty,
            inference: $inf,
            image: $img,
            search: $s,
        }
    };
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    entry!("gpt-4o", "GPT 4o", "/gpt", 2.5, 10.0, None, Default, inference: false, image: true, search: false),
    entry!("gpt-4o-mini", "GPT 4o mini", "/gpt", 0.15, 0.6, None, Default, inference: false, image: true, search: false),
    entry!("o1", "o1", "/gpt", 15.0, 60.0, None, Reason, inference: true, image: true, search: false),
    entry!("o1-preview", "o1 preview", "/gpt", 15.0, 60.0, None, None, inference: true, image: false, search: false),
    entry!("o1-mini", "o1 mini", "/gpt", 1.1, 4.4, None, None, inference: true, image: false, search: false),
    entry!("o3-mini", "o3 mini", "/gpt", 1.1, 4.4, None, Reason, inference: true, image: false, search: false),
    entry!("claude-3-5-sonnet-latest", "Claude 3.5 Sonnet", "/claude", 3.0, 15.0, None, Default, inference: false, image: true, search: false),
    entry!("gemini-2.0-flash", "Gemini 2.0 Flash", "/gemini", 0.1, 0.4, None, Default, inference: false, image: true, search: false),
    entry!("deepseek-chat", "DeepSeek V3", "/deepseek", 0.27, 1.1, None, Default, inference: false, image: false, search: false),
    entry!("deepseek-reasoner", "DeepSeek R1", "/deepseek", 0.55, 2.19, None, None, inference: true, image: false, search: false),
    entry!("llama3.3-70b", "Llama 3.3 70B", "/llama", 0.6, 0.6, None, Default, inference: false, image: false, search: false),
    entry!("sonar", "Perplexity Sonar", "/perplexity", 1.0, 1.0, Some(5.0), Default, inference: false, image: false, search: true),
    entry!("sonar-reasoning", "Perplexity Sonar Reasoning", "/perplexity", 1.0, 5.0, Some(5.0), None, inference: true, image: false, search: true),
];

/// Name of the model selected on a fresh conversation
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Filters for narrowing the model list shown to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelFilter {
    pub search: bool,
    pub inference: bool,
    pub image: bool,
}

/// An ordered set of models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelInfo>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    /// The compiled-in catalog
    pub fn builtin() -> Self {
        Self {
            models: MODEL_ENTRIES.iter().map(|e| e.to_model()).collect(),
        }
    }

    /// Parse a catalog from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: ModelCatalog = serde_json::from_str(json)?;
        if catalog.models.is_empty() {
            return Err(Error::InvalidConfig("model catalog is empty".into()));
        }
        Ok(catalog)
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::debug!("Loaded {} models from {}", catalog.models.len(), path.display());
        Ok(catalog)
    }

    /// Look up a model by name
    pub fn get(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.model_name == name)
    }

    /// Look up a model by name, failing with `ModelNotFound`
    pub fn require(&self, name: &str) -> Result<&ModelInfo> {
        self.get(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    /// Whether the catalog lists the model
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Models that pass the filter. A set flag keeps only models with that capability.
    pub fn filtered(&self, filter: ModelFilter) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| !filter.search || m.supports_search())
            .filter(|m| !filter.inference || m.inference)
            .filter(|m| !filter.image || m.supports_image())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_default_model() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.get(DEFAULT_MODEL).unwrap();
        assert_eq!(model.endpoint, "/gpt");
        assert!(model.supports_image());
        assert_eq!(model.model_type, ModelType::Default);
    }

    #[test]
    fn test_builtin_names_unique() {
        let catalog = ModelCatalog::builtin();
        let mut names: Vec<_> = catalog.models.iter().map(|m| &m.model_name).collect();
        let len = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), len);
    }

    #[test]
    fn test_toggle_targets_exist() {
        let catalog = ModelCatalog::builtin();
        for name in ["sonar", "sonar-reasoning", "o1", "gpt-4o"] {
            assert!(catalog.contains(name), "{name} missing");
        }
        assert!(catalog.get("sonar").unwrap().search_billing.is_some());
    }

    #[test]
    fn test_require_unknown() {
        let catalog = ModelCatalog::builtin();
        assert!(matches!(
            catalog.require("gpt-2"),
            Err(Error::ModelNotFound(name)) if name == "gpt-2"
        ));
    }

    #[test]
    fn test_filtered() {
        let catalog = ModelCatalog::builtin();
        let search = catalog.filtered(ModelFilter {
            search: true,
            ..Default::default()
        });
        assert!(search.iter().all(|m| m.supports_search()));
        assert!(!search.is_empty());

        let both = catalog.filtered(ModelFilter {
            search: true,
            inference: true,
            image: false,
        });
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].model_name, "sonar-reasoning");

        let images = catalog.filtered(ModelFilter {
            image: true,
            ..Default::default()
        });
        assert!(images.iter().any(|m| m.model_name == "gpt-4o"));
        assert_eq!(catalog.filtered(ModelFilter::default()).len(), catalog.models.len());
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{"models": [{
            "model_name": "local",
            "model_alias": "Local",
            "endpoint": "/gpt",
            "in_billing": 0,
            "out_billing": 0
        }]}"#;
        let catalog = ModelCatalog::from_json(json).unwrap();
        let model = catalog.get("local").unwrap();
        assert!(model.stream);
        assert_eq!(model.model_type, ModelType::Default);
        assert!(!model.supports_image());
    }

    #[test]
    fn test_from_json_rejects_empty() {
        assert!(matches!(
            ModelCatalog::from_json(r#"{"models": []}"#),
            Err(Error::InvalidConfig(_))
        ));
    }
}
