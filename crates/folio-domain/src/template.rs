//! Template module - ordered extraction workflows

use crate::hash::prompt_hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised when a template definition is malformed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Template has no modules
    #[error("template '{0}' has no modules")]
    Empty(String),

    /// Two modules share a name
    #[error("duplicate module name: {0}")]
    DuplicateModule(String),

    /// Module name cannot be used as a file stem
    #[error("invalid module name '{0}': use letters, digits, '_' or '-'")]
    InvalidModuleName(String),

    /// A referenced module does not exist
    #[error("unknown module: {0}")]
    UnknownModule(String),
}

/// One named step of a template: a single request + schema unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module (stage) name, unique within a template
    pub name: String,

    /// System prompt template
    #[serde(rename = "system")]
    pub system_prompt: String,

    /// User prompt template
    #[serde(rename = "user")]
    pub user_prompt: String,

    /// JSON-schema fragment describing this module's output
    #[serde(default = "empty_schema")]
    pub schema: Value,

    /// Fields that must be present in the output, in addition to the
    /// schema's own `required` list
    #[serde(default)]
    pub required: Vec<String>,
}

fn empty_schema() -> Value {
    Value::Object(Default::default())
}

impl Module {
    /// Create a module with no extra required fields
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            schema,
            required: Vec::new(),
        }
    }

    /// Add required fields
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Fingerprint of the prompt text and schema
    ///
    /// A stored output whose hash differs from this one is stale.
    pub fn prompt_hash(&self) -> String {
        prompt_hash(&self.system_prompt, &self.user_prompt, &self.schema.to_string())
    }

    /// Union of `required` and the schema's top-level `required` array, in
    /// first-seen order
    pub fn required_fields(&self) -> Vec<String> {
        let from_schema = self
            .schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_string);

        let mut seen = HashSet::new();
        self.required
            .iter()
            .cloned()
            .chain(from_schema)
            .filter(|field| seen.insert(field.clone()))
            .collect()
    }

    fn validate_name(&self) -> Result<(), TemplateError> {
        let valid = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(TemplateError::InvalidModuleName(self.name.clone()))
        }
    }
}

/// An ordered set of modules defining one extraction workflow
///
/// Module order is execution order for every document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template identifier, recorded as `prompt_template` in outputs
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Modules in execution order
    pub modules: Vec<Module>,
}

impl Template {
    /// Create and validate a template
    ///
    /// # Examples
    ///
    /// ```
    /// use folio_domain::{Module, Template};
    /// use serde_json::json;
    ///
    /// let template = Template::new("two_pass", vec![
    ///     Module::new("meta", "sys", "{content}", json!({})),
    ///     Module::new("summary", "sys", "{content}", json!({})),
    /// ]).unwrap();
    /// assert!(template.is_multi_stage());
    /// assert_eq!(template.module_names(), vec!["meta", "summary"]);
    /// ```
    pub fn new(name: impl Into<String>, modules: Vec<Module>) -> Result<Self, TemplateError> {
        let template = Self {
            name: name.into(),
            description: String::new(),
            modules,
        };
        template.validate()?;
        Ok(template)
    }

    /// Check module names are present, well formed and unique
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.modules.is_empty() {
            return Err(TemplateError::Empty(self.name.clone()));
        }
        let mut names = HashSet::new();
        for module in &self.modules {
            module.validate_name()?;
            if !names.insert(module.name.as_str()) {
                return Err(TemplateError::DuplicateModule(module.name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a module by name
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Position of a module in execution order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    /// Module names in execution order
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Whether the template has more than one module
    pub fn is_multi_stage(&self) -> bool {
        self.modules.len() > 1
    }

    /// Fail on the first name not present in this template
    pub fn check_module_names<'a, I>(&self, names: I) -> Result<(), TemplateError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for name in names {
            if self.module(name).is_none() {
                return Err(TemplateError::UnknownModule(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module(name: &str) -> Module {
        Module::new(name, "system", "user {content}", json!({}))
    }

    #[test]
    fn test_empty_template_rejected() {
        let result = Template::new("t", vec![]);
        assert!(matches!(result, Err(TemplateError::Empty(_))));
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let result = Template::new("t", vec![module("a"), module("a")]);
        assert_eq!(result, Err(TemplateError::DuplicateModule("a".to_string())));
    }

    #[test]
    fn test_module_name_must_be_file_safe() {
        let result = Template::new("t", vec![module("../evil")]);
        assert!(matches!(result, Err(TemplateError::InvalidModuleName(_))));
    }

    #[test]
    fn test_required_fields_union() {
        let m = Module::new(
            "meta",
            "s",
            "u",
            json!({"type": "object", "required": ["title", "year"]}),
        )
        .with_required(["authors", "title"]);
        assert_eq!(m.required_fields(), vec!["authors", "title", "year"]);
    }

    #[test]
    fn test_prompt_hash_changes_with_prompt_text() {
        let a = module("a");
        let mut b = module("a");
        b.user_prompt.push_str(" please");
        assert_ne!(a.prompt_hash(), b.prompt_hash());
        assert_eq!(a.prompt_hash(), module("a").prompt_hash());
    }

    #[test]
    fn test_position_and_lookup() {
        let t = Template::new("t", vec![module("a"), module("b")]).unwrap();
        assert_eq!(t.position("b"), Some(1));
        assert!(t.module("c").is_none());
        assert!(t.check_module_names(&["c".to_string()]).is_err());
    }

    #[test]
    fn test_template_deserializes_with_defaults() {
        let template: Template = serde_json::from_value(json!({
            "name": "two_pass",
            "modules": [
                {"name": "meta", "system": "You extract metadata.", "user": "{content}", "required": ["title"]},
                {"name": "summary", "system": "You summarize.", "user": "{context}\n{content}",
                 "schema": {"type": "object", "required": ["summary"]}}
            ]
        }))
        .unwrap();
        assert_eq!(template.module_names(), vec!["meta", "summary"]);
        assert_eq!(template.modules[0].schema, json!({}));
        assert_eq!(template.modules[1].required_fields(), vec!["summary"]);
        assert!(template.description.is_empty());
    }
}
