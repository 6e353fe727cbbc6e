use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    load_config_from_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text.
pub fn load_config_from_str(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=/path/to/catalogs\n\
             2. Replace $env{{{0}}} in the config file with an actual path",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables (e.g., export DATA_DIR=/data)\n\
             2. Replace the variables in the config file with actual paths",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    for catalog in config.provider.catalogs.iter_mut() {
        *catalog = expand_tilde(catalog);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_provider(&config.provider, &mut errors);
    validate_stream(&config.stream, &mut errors);

    if config.stations.is_empty() {
        errors.push("stations must contain at least one NET.STA.LOC code".to_string());
    }

    let mut seen = HashSet::new();
    for nsl in &config.stations {
        if !seen.insert(nsl) {
            errors.push(format!("stations: duplicate station '{}'", nsl));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_provider(provider: &ProviderConfig, errors: &mut Vec<String>) {
    if provider.catalogs.is_empty() {
        errors.push("provider.catalogs: no catalog files provided".to_string());
    }

    if provider.prefetch_batches == 0 {
        errors.push("provider.prefetch_batches must be at least 1".to_string());
    }

    if let (Some(start), Some(end)) = (provider.start_time, provider.end_time) {
        if start >= end {
            errors.push(format!(
                "provider.start_time ({}) must be before provider.end_time ({})",
                start, end
            ));
        }
    }
}

fn validate_stream(stream: &StreamConfig, errors: &mut Vec<String>) {
    if stream.window_increment.is_zero() {
        errors.push("stream.window_increment must be positive".to_string());
    }

    if let Some(min_length) = stream.min_length {
        if min_length > stream.window_increment {
            errors.push(format!(
                "stream.min_length ({:?}) exceeds window_increment ({:?}), every batch would be dropped",
                min_length, stream.window_increment
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Completeness;
    use std::time::Duration;

    const MINIMAL: &str = r#"
provider:
  catalogs:
    - /data/catalog.yml
stream:
  window_increment: 10m
stations:
  - "6E.TE01."
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();

        assert_eq!(config.provider.prefetch_batches, 10);
        assert_eq!(config.provider.channel_selector.pattern(), "*");
        assert_eq!(config.provider.completeness, Completeness::Complete);
        assert!(config.provider.start_time.is_none());
        assert_eq!(config.stream.window_increment, Duration::from_secs(600));
        assert_eq!(config.stream.window_padding, Duration::ZERO);
        assert!(config.stream.min_length.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
provider:
  catalogs: [/data/a.yml, /data/b.yml]
  start_time: 2026-01-28T00:00:00Z
  end_time: 2026-01-29T00:00:00+00:00
  channel_selector: EN?
  prefetch_batches: 4
  completeness: incomplete
stream:
  window_increment: 5m
  window_padding: 30s
  min_length: 4m 30s
stations:
  - "6E.TE01."
  - ["6E", "TE02", "00"]
"#;
        let config = load_config_from_str(yaml).unwrap();

        assert_eq!(config.provider.catalogs.len(), 2);
        assert_eq!(config.provider.channel_selector.pattern(), "EN?");
        assert_eq!(config.provider.completeness, Completeness::Incomplete);
        assert_eq!(config.stream.window_padding, Duration::from_secs(30));
        assert_eq!(config.stream.min_length, Some(Duration::from_secs(270)));
        assert_eq!(config.stations[1].location, "00");
    }

    #[test]
    fn test_rejects_inverted_times() {
        let yaml = MINIMAL.replace(
            "  catalogs:",
            "  start_time: 2026-01-29T00:00:00Z\n  end_time: 2026-01-28T00:00:00Z\n  catalogs:",
        );
        match load_config_from_str(&yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert!(errors.iter().any(|e| e.contains("must be before")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_long_channel_selector() {
        let yaml = MINIMAL.replace("  catalogs:", "  channel_selector: HHZZ\n  catalogs:");
        assert!(matches!(
            load_config_from_str(&yaml),
            Err(ConfigError::YamlParse(_))
        ));
    }

    #[test]
    fn test_collects_multiple_validation_errors() {
        let yaml = r#"
provider:
  catalogs: []
  prefetch_batches: 0
stream:
  window_increment: 0s
stations: []
"#;
        match load_config_from_str(yaml) {
            Err(ConfigError::ValidationList(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_duplicate_stations() {
        let yaml = MINIMAL.replace(
            "  - \"6E.TE01.\"",
            "  - \"6E.TE01.\"\n  - [\"6E\", \"TE01\", \"\"]",
        );
        match load_config_from_str(&yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert!(errors[0].contains("duplicate station"));
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpanded_env_var() {
        let yaml = MINIMAL.replace("/data/catalog.yml", "$env{WAVESTREAM_UNSET_DIR}/catalog.yml");
        match load_config_from_str(&yaml) {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("WAVESTREAM_UNSET_DIR")),
            other => panic!("expected env var error, got {:?}", other),
        }
    }
}
