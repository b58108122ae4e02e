//! Compiler options
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration.

use serde::{Deserialize, Serialize};

/// Options controlling one compile call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Identifier prefixes that denote a variable lookup (`var.name`)
    pub variable_prefixes: Vec<String>,
    /// Maximum nesting of function calls inside one value
    pub max_call_depth: usize,
    /// Minimum Jaro-Winkler similarity for "did you mean" hints
    pub suggestion_threshold: f64,
    /// Report a missing `project` block
    pub require_project: bool,
    /// Warn about declared variables nothing refers to
    pub warn_on_unused_variables: bool,
    /// Pattern every declared id must match
    pub id_pattern: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            variable_prefixes: vec!["var.".to_string(), "vars.".to_string()],
            max_call_depth: 64,
            suggestion_threshold: 0.8,
            require_project: true,
            warn_on_unused_variables: true,
            id_pattern: r"^[A-Za-z_][A-Za-z0-9_\-]*$".to_string(),
        }
    }
}

impl CompilerOptions {
    /// Split `var.name.path` into its variable path (`name.path`) when the
    /// identifier carries one of the configured prefixes.
    pub fn variable_path<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        self.variable_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .find_map(|p| identifier.strip_prefix(p.as_str()))
            .filter(|rest| !rest.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert_eq!(options.max_call_depth, 64);
        assert!(options.require_project);
    }

    #[test]
    fn test_variable_path() {
        let options = CompilerOptions::default();
        assert_eq!(options.variable_path("var.kinds.0"), Some("kinds.0"));
        assert_eq!(options.variable_path("vars.x"), Some("x"));
        assert_eq!(options.variable_path("variable"), None);
        assert_eq!(options.variable_path("var."), None);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options: CompilerOptions = serde_yaml::from_str("max_call_depth: 8\n").unwrap();
        assert_eq!(options.max_call_depth, 8);
        assert_eq!(options.variable_prefixes.len(), 2);
    }
}
