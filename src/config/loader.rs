//! Configuration loader
//!
//! Loads and validates the YAML compiler options file.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::info;

use super::types::CompilerOptions;

/// Environment variable naming an options file
pub const CONFIG_ENV_VAR: &str = "WORLD_DSL_CONFIG";

pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Loader that always yields the default options
    pub fn defaults() -> Self {
        Self { path: None }
    }

    /// Create loader from the WORLD_DSL_CONFIG env var, or defaults when unset
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::new(path),
            _ => Self::defaults(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load and validate the options
    pub fn load(&self) -> Result<CompilerOptions> {
        let Some(path) = &self.path else {
            return Ok(CompilerOptions::default());
        };

        info!("Loading compiler options from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let options: CompilerOptions = if content.trim().is_empty() {
            CompilerOptions::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };

        Self::validate(&options)
            .with_context(|| format!("Invalid compiler options in {}", path.display()))?;

        Ok(options)
    }

    fn validate(options: &CompilerOptions) -> Result<()> {
        if options.variable_prefixes.is_empty() {
            return Err(anyhow!("variable_prefixes must not be empty"));
        }
        if let Some(bad) = options
            .variable_prefixes
            .iter()
            .find(|p| p.is_empty() || p.starts_with('$'))
        {
            return Err(anyhow!(
                "invalid variable prefix '{}': must be non-empty and must not start with '$'",
                bad
            ));
        }
        if options.max_call_depth == 0 {
            return Err(anyhow!("max_call_depth must be at least 1"));
        }
        if !(0.0..=1.0).contains(&options.suggestion_threshold) {
            return Err(anyhow!(
                "suggestion_threshold must be within 0.0..=1.0, got {}",
                options.suggestion_threshold
            ));
        }
        Regex::new(&options.id_pattern)
            .with_context(|| format!("id_pattern '{}' is not a valid regex", options.id_pattern))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_path() {
        let options = ConfigLoader::defaults().load().unwrap();
        assert_eq!(options, CompilerOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config("variable_prefixes: [\"v.\"]\nrequire_project: false\n");
        let options = ConfigLoader::new(file.path()).load().unwrap();
        assert_eq!(options.variable_prefixes, vec!["v.".to_string()]);
        assert!(!options.require_project);
        assert_eq!(options.max_call_depth, 64);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = write_config("");
        let options = ConfigLoader::new(file.path()).load().unwrap();
        assert_eq!(options, CompilerOptions::default());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let file = write_config("suggestion_threshold: 3.5\n");
        let err = ConfigLoader::new(file.path()).load().unwrap_err();
        assert!(format!("{:#}", err).contains("suggestion_threshold"));
    }

    #[test]
    fn test_rejects_dollar_prefix() {
        let file = write_config("variable_prefixes: [\"$\"]\n");
        assert!(ConfigLoader::new(file.path()).load().is_err());
    }

    #[test]
    fn test_rejects_bad_regex() {
        let file = write_config("id_pattern: \"([\"\n");
        assert!(ConfigLoader::new(file.path()).load().is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ConfigLoader::new("/nonexistent/world-dsl.yaml")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/world-dsl.yaml"));
    }
}
