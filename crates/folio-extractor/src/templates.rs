//! Template catalogue: the built-in default and file-defined templates
//!
//! A template file is TOML (or JSON, by extension) with a `name`, an optional
//! `description` and one `[[modules]]` entry per stage:
//!
//! ```toml
//! name = "two_pass"
//!
//! [[modules]]
//! name = "meta"
//! system = "You extract bibliographic metadata."
//! user = "Return JSON matching {schema}.\n\n{content}"
//! required = ["title"]
//!
//! [modules.schema]
//! type = "object"
//! ```

use crate::error::{ExtractorError, Result};
use folio_domain::{Module, Template};
use serde_json::json;
use std::path::Path;
use tracing::debug;

/// Template used when none is named
pub const DEFAULT_TEMPLATE: &str = "simple";

const SIMPLE_SYSTEM: &str = "You are a research assistant that reads academic papers and \
returns structured metadata. Answer with a single JSON object and nothing else. Write all \
free-text fields in {output_language}.";

const SIMPLE_USER: &str = "Extract the paper's metadata and a short summary.\n\n\
The JSON object must match this schema:\n{schema}\n\n\
Paper:\n{content}";

/// Names of the built-in templates
pub fn builtin_names() -> Vec<&'static str> {
    vec![DEFAULT_TEMPLATE]
}

/// Look up a built-in template
pub fn builtin(name: &str) -> Option<Template> {
    match name {
        DEFAULT_TEMPLATE => Some(simple()),
        _ => None,
    }
}

/// The single-module default: bibliographic metadata plus a summary
fn simple() -> Template {
    let module = Module::new(
        "paper",
        SIMPLE_SYSTEM,
        SIMPLE_USER,
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "authors": { "type": "array", "items": { "type": "string" } },
                "year": { "type": ["integer", "null"] },
                "venue": { "type": ["string", "null"] },
                "abstract": { "type": "string" },
                "keywords": { "type": "array", "items": { "type": "string" } },
                "summary": { "type": "string" }
            },
            "required": ["title", "authors", "summary"]
        }),
    );
    Template {
        name: DEFAULT_TEMPLATE.to_string(),
        description: "Paper metadata and summary in one request".to_string(),
        modules: vec![module],
    }
}

/// Load and validate a template file
pub fn load_template_file(path: &Path) -> Result<Template> {
    let text = std::fs::read_to_string(path).map_err(|e| ExtractorError::io(path, e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let template: Template = if is_json {
        serde_json::from_str(&text)?
    } else {
        toml::from_str(&text)?
    };
    template.validate()?;

    debug!(
        "Loaded template '{}' ({} modules) from {}",
        template.name,
        template.modules.len(),
        path.display()
    );
    Ok(template)
}

/// Resolve a template reference: an existing file path, or a built-in name
pub fn resolve_template(reference: &str) -> Result<Template> {
    let path = Path::new(reference);
    if path.is_file() {
        return load_template_file(path);
    }
    builtin(reference).ok_or_else(|| {
        ExtractorError::Config(format!(
            "unknown template '{}'; built-in templates: {}",
            reference,
            builtin_names().join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_builtin_simple_is_valid() {
        let template = builtin("simple").unwrap();
        assert!(template.validate().is_ok());
        assert!(!template.is_multi_stage());
        assert_eq!(
            template.modules[0].required_fields(),
            vec!["title", "authors", "summary"]
        );
    }

    #[test]
    fn test_builtin_prompt_hash_is_stable() {
        assert_eq!(
            builtin("simple").unwrap().modules[0].prompt_hash(),
            simple().modules[0].prompt_hash()
        );
    }

    #[test]
    fn test_load_toml_template() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
name = "two_pass"
description = "metadata then summary"

[[modules]]
name = "meta"
system = "sys"
user = "{{content}}"
required = ["title"]

[modules.schema]
type = "object"

[[modules]]
name = "summary"
system = "sys"
user = "{{context}}"
"#
        )
        .unwrap();

        let template = load_template_file(file.path()).unwrap();
        assert_eq!(template.name, "two_pass");
        assert_eq!(template.module_names(), vec!["meta", "summary"]);
        assert_eq!(template.modules[0].user_prompt, "{content}");
        assert_eq!(template.modules[0].schema["type"], "object");
        assert!(template.modules[1].schema.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_load_json_template_rejects_duplicates() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"name": "dup", "modules": [
                {{"name": "a", "system": "s", "user": "u"}},
                {{"name": "a", "system": "s", "user": "u"}}
            ]}}"#
        )
        .unwrap();

        let result = load_template_file(file.path());
        assert!(matches!(result, Err(ExtractorError::Template(_))));
    }

    #[test]
    fn test_resolve_unknown_name() {
        let err = resolve_template("no_such_template").unwrap_err();
        assert!(err.to_string().contains("simple"));
    }
}
