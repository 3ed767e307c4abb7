//! Ordered, override-aware environment variable resolution.
//!
//! A context is built by applying layers in order. Setting a name that is
//! already present replaces its value in place, so the result only depends
//! on the order in which layers are applied.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const SECURE_DISPLAY: &str = "********";
pub const MASK: &str = "******";

/// A single configured variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secure: bool,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: false,
        }
    }

    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: true,
        }
    }

    /// Value as it may appear in console output.
    pub fn display_value(&self) -> &str {
        if self.secure { SECURE_DISPLAY } else { &self.value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariableContext {
    properties: IndexMap<String, EnvironmentVariable>,
}

impl EnvironmentVariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        let mut context = Self::new();
        for (name, value) in std::env::vars() {
            context.set_property(name, value, false);
        }
        context
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>, secure: bool) {
        let name = name.into();
        let variable = EnvironmentVariable {
            name: name.clone(),
            value: value.into(),
            secure,
        };
        self.properties.insert(name, variable);
    }

    /// Sets a property whose name is derived from user data, e.g. a
    /// material name.
    pub fn set_property_with_escape(&mut self, name: &str, value: impl Into<String>) {
        self.set_property(escape_name(name), value, false);
    }

    pub fn add(&mut self, variable: &EnvironmentVariable) {
        self.set_property(variable.name.clone(), variable.value.clone(), variable.secure);
    }

    pub fn add_all<'a>(&mut self, variables: impl IntoIterator<Item = &'a EnvironmentVariable>) {
        for variable in variables {
            self.add(variable);
        }
    }

    /// Applies every property of `other`, in its order, on top of this context.
    pub fn add_all_from(&mut self, other: &EnvironmentVariableContext) {
        self.add_all(other.properties.values());
    }

    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|v| v.value.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&EnvironmentVariable> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn is_secure(&self, name: &str) -> bool {
        self.properties.get(name).is_some_and(|v| v.secure)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentVariable> {
        self.properties.values()
    }

    /// Name/value pairs in application order, ready for a child process.
    pub fn to_env_pairs(&self) -> Vec<(String, String)> {
        self.properties
            .values()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    pub fn secure_values(&self) -> Vec<String> {
        self.properties
            .values()
            .filter(|v| v.secure && !v.value.is_empty())
            .map(|v| v.value.clone())
            .collect()
    }

    /// Console lines describing how this context changes `ambient`.
    pub fn report_lines(&self, ambient: &EnvironmentVariableContext) -> Vec<String> {
        self.properties
            .values()
            .map(|v| {
                if ambient.has_property(&v.name) {
                    format!(
                        "[go] overriding environment variable '{}' with value '{}'",
                        v.name,
                        v.display_value()
                    )
                } else {
                    format!(
                        "[go] setting environment variable '{}' to value '{}'",
                        v.name,
                        v.display_value()
                    )
                }
            })
            .collect()
    }
}

impl<'a> FromIterator<&'a EnvironmentVariable> for EnvironmentVariableContext {
    fn from_iter<I: IntoIterator<Item = &'a EnvironmentVariable>>(iter: I) -> Self {
        let mut context = Self::new();
        context.add_all(iter);
        context
    }
}

/// Upper-cases a name and replaces anything outside `[A-Z0-9_]` with `_`.
pub fn escape_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Replaces every occurrence of the given secrets in `line`.
pub fn mask_secrets(line: &str, secrets: &[String]) -> String {
    let mut masked = line.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        if masked.contains(secret.as_str()) {
            masked = masked.replace(secret.as_str(), MASK);
        }
    }
    masked
}
