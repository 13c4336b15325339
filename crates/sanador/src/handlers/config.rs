//! Config command handler

use crate::error::{CliError, CliResult};
use crate::handlers::identify::load_healing_config;
use crate::output::Reporter;
use crate::ConfigArgs;
use sanar::config::CONFIG_KEYS;
use sanar::HealingConfig;

/// Parse a config setting string into key-value pair
#[must_use]
pub fn parse_setting(setting: &str) -> Option<(&str, &str)> {
    setting
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
}

/// Base configuration with `--set` overrides applied
pub fn effective_config(args: &ConfigArgs) -> CliResult<HealingConfig> {
    let mut config = load_healing_config(args.file.as_deref())?;
    for setting in &args.set {
        let (key, value) = parse_setting(setting).ok_or_else(|| {
            CliError::invalid_argument(format!("expected KEY=VALUE, got {setting:?}"))
        })?;
        config.set(key, value)?;
    }
    config.validate()?;
    Ok(config)
}

/// Execute the config command
pub fn execute_config(reporter: &Reporter, args: &ConfigArgs) -> CliResult<()> {
    if args.keys {
        if reporter.json {
            return reporter.emit_json(&CONFIG_KEYS);
        }
        for key in CONFIG_KEYS {
            reporter.item(key);
        }
        return Ok(());
    }
    let config = effective_config(args)?;
    if reporter.json {
        return reporter.emit_json(&config);
    }
    let yaml = serde_yaml_ng::to_string(&config).map_err(|e| CliError::config(e.to_string()))?;
    reporter.header("Healing configuration");
    for line in yaml.lines() {
        reporter.item(line);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(set: &[&str]) -> ConfigArgs {
        ConfigArgs {
            file: None,
            set: set.iter().map(|s| (*s).to_string()).collect(),
            keys: false,
        }
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(parse_setting("AI_ENABLED=false"), Some(("AI_ENABLED", "false")));
        assert_eq!(parse_setting("k = a=b"), Some(("k", "a=b")));
        assert_eq!(parse_setting("no_equals_sign"), None);
        assert_eq!(parse_setting("=x"), None);
    }

    #[test]
    fn test_overrides_apply() {
        let config =
            effective_config(&args(&["AI_CONFIDENCE_THRESHOLD=0.9", "AI_UI_ONLY=false"])).unwrap();
        assert!((config.confidence_threshold - 0.9).abs() < 1e-9);
        assert!(!config.ui_only);
    }

    #[test]
    fn test_invalid_overrides_fail() {
        assert!(matches!(
            effective_config(&args(&["oops"])),
            Err(CliError::InvalidArgument { .. })
        ));
        assert!(matches!(
            effective_config(&args(&["AI_CONFIDENCE_THRESHOLD=2"])),
            Err(CliError::Sanar(_))
        ));
    }
}
