//! /model command - list and switch models

use super::CommandResult;
use parley_api::{ModelCatalog, ModelFilter, ModelInfo};
use parley_chat::Settings;

pub struct ModelCommand;

impl ModelCommand {
    /// Show models for the current toggles, or switch to a matching model
    pub fn execute(args: &str, settings: &Settings, catalog: &ModelCatalog) -> CommandResult {
        if args.is_empty() {
            let models = catalog.filtered(settings.model_filter());
            return CommandResult::Message(list_models(&settings.model, &models));
        }

        match find_model(args, catalog) {
            Some(model) => CommandResult::ChangeModel(model.model_name.clone()),
            None => CommandResult::Message(format!(
                "No model found matching '{}'\nUse /models to list available models",
                args
            )),
        }
    }

    /// List every model, ignoring the toggles
    pub fn list_models_text(settings: &Settings, catalog: &ModelCatalog) -> String {
        let models = catalog.filtered(ModelFilter::default());
        list_models(&settings.model, &models)
    }
}

fn list_models(current: &str, models: &[&ModelInfo]) -> String {
    if models.is_empty() {
        return "No models available".to_string();
    }

    let mut output = String::from("Available models:\n");

    // Group by endpoint, keeping catalog order
    let mut endpoints: Vec<&str> = Vec::new();
    for model in models {
        if !endpoints.contains(&model.endpoint.as_str()) {
            endpoints.push(&model.endpoint);
        }
    }

    for endpoint in endpoints {
        output.push_str(&format!("\n{}:\n", endpoint.trim_start_matches('/')));
        for model in models.iter().filter(|m| m.endpoint == endpoint) {
            let marker = if model.model_name == current { " *" } else { "" };
            let mut tags = Vec::new();
            if model.inference {
                tags.push("reasoning");
            }
            if model.supports_search() {
                tags.push("search");
            }
            if model.supports_image() {
                tags.push("images");
            }
            let tags = if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            };
            output.push_str(&format!(
                "  {:<26} {}{}{}\n",
                model.model_name, model.model_alias, tags, marker
            ));
        }
    }

    output.push_str("\nSwitch with: /model <name>");
    output
}

fn find_model<'a>(query: &str, catalog: &'a ModelCatalog) -> Option<&'a ModelInfo> {
    let query_lower = query.to_lowercase();

    // Exact match first
    if let Some(model) = catalog
        .models
        .iter()
        .find(|m| m.model_name.to_lowercase() == query_lower)
    {
        return Some(model);
    }

    // Partial match
    if let Some(model) = catalog
        .models
        .iter()
        .find(|m| m.model_name.to_lowercase().contains(&query_lower))
    {
        return Some(model);
    }

    // Match by alias
    catalog
        .models
        .iter()
        .find(|m| m.model_alias.to_lowercase().contains(&query_lower))
}
