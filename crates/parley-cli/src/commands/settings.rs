//! /settings, /temp, /reason and /system commands

use super::CommandResult;
use parley_api::ModelType;
use parley_chat::Settings;
use parley_chat::settings::{MAX_REASON, parse_reason, reason_label};

pub struct SettingsCommand;

impl SettingsCommand {
    pub fn execute(settings: &Settings) -> String {
        let on_off = |b: bool| if b { "on" } else { "off" };

        let mut output = String::from("Settings\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!("Model:        {}\n", settings.model));

        let temperature = if settings.is_temperature_locked() {
            format!("{:.1} (fixed)", settings.temperature)
        } else {
            format!("{:.1}", settings.temperature)
        };
        output.push_str(&format!("Temperature:  {}\n", temperature));
        if settings.model_type == ModelType::Reason {
            output.push_str(&format!("Reasoning:    {}\n", reason_label(settings.reason)));
        }

        let system = if settings.is_instruction_locked() {
            "(not supported)".to_string()
        } else if settings.system_message.is_empty() {
            "(none)".to_string()
        } else {
            crate::utils::truncate_chars(&settings.system_message, 60)
        };
        output.push_str(&format!("System:       {}\n", system));
        output.push_str(&format!(
            "Search: {}  Think: {}  DAN: {}\n",
            on_off(settings.is_search),
            on_off(settings.is_inference),
            on_off(settings.is_dan)
        ));
        output
    }
}

pub struct TemperatureCommand;

impl TemperatureCommand {
    pub fn execute(args: &str, settings: &Settings) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!("Temperature: {:.1}", settings.temperature));
        }
        match args.parse::<f32>() {
            Ok(t) => CommandResult::SetTemperature(t),
            Err(_) => CommandResult::Message(format!(
                "Invalid temperature '{}'. Use a number between 0 and 1.",
                args
            )),
        }
    }
}

pub struct ReasonCommand;

impl ReasonCommand {
    pub fn execute(args: &str, settings: &Settings) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(show_levels(settings.reason));
        }
        match parse_reason(args) {
            Some(level) => CommandResult::SetReason(level),
            None => CommandResult::Message(format!(
                "Unknown reasoning level: '{}'\nValid levels: 0-{}, low, medium, high",
                args, MAX_REASON
            )),
        }
    }
}

fn show_levels(current: u8) -> String {
    let levels = [
        (0, "Model default"),
        (1, "Light reasoning"),
        (2, "Moderate reasoning"),
        (3, "Deep reasoning"),
    ];

    let mut output = String::from("Reasoning levels:\n\n");

    for (level, desc) in levels {
        let marker = if level == current { " *" } else { "" };
        output.push_str(&format!("  {:<10} {}{}\n", reason_label(level), desc, marker));
    }

    output.push_str("\nSet with: /reason <level>");
    output
}

pub struct SystemCommand;

impl SystemCommand {
    /// `/system` shows, `/system -` clears, anything else sets
    pub fn execute(args: &str, settings: &Settings) -> CommandResult {
        match args {
            "" if settings.system_message.is_empty() => {
                CommandResult::Message("No system message set".to_string())
            }
            "" => CommandResult::Message(format!("System message:\n{}", settings.system_message)),
            "-" => CommandResult::SetSystem(String::new()),
            text => CommandResult::SetSystem(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_command() {
        let settings = Settings::default();
        assert_eq!(
            SystemCommand::execute("-", &settings),
            CommandResult::SetSystem(String::new())
        );
        assert_eq!(
            SystemCommand::execute("Be terse.", &settings),
            CommandResult::SetSystem("Be terse.".into())
        );
    }

    #[test]
    fn test_settings_summary_marks_fixed_temperature() {
        let settings = Settings {
            model: "o1-mini".into(),
            model_type: ModelType::None,
            temperature: 1.0,
            ..Settings::default()
        };
        let text = SettingsCommand::execute(&settings);
        assert!(text.contains("1.0 (fixed)"));
        assert!(text.contains("(not supported)"));
    }

    #[test]
    fn test_reason_levels_listing() {
        let CommandResult::Message(text) = ReasonCommand::execute("", &Settings::default()) else {
            panic!("expected a listing");
        };
        assert!(text.contains("off        Model default *"));
    }
}
