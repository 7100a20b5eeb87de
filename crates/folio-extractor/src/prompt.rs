//! Prompt rendering and content truncation

use crate::config::TruncateStrategy;
use folio_domain::Module;
use serde_json::{Map, Value};

/// Marker inserted where `head_tail` truncation removed text
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]\n\n";

/// Document content after truncation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    /// Text to send
    pub text: String,

    /// Whether anything was removed
    pub truncated: bool,

    /// Character count before truncation
    pub original_chars: usize,
}

/// Cut `content` to at most `max_chars` characters of source text
///
/// `max_chars == 0` disables truncation. `HeadTail` keeps the first half and
/// the last half, joined by [`TRUNCATION_MARKER`].
pub fn truncate(content: &str, max_chars: usize, strategy: TruncateStrategy) -> Truncated {
    let original_chars = content.chars().count();
    if max_chars == 0 || original_chars <= max_chars {
        return Truncated {
            text: content.to_string(),
            truncated: false,
            original_chars,
        };
    }

    let text = match strategy {
        TruncateStrategy::Head => content.chars().take(max_chars).collect(),
        TruncateStrategy::HeadTail => {
            let head_len = max_chars / 2;
            let tail_len = max_chars - head_len;
            let head: String = content.chars().take(head_len).collect();
            let tail: String = content.chars().skip(original_chars - tail_len).collect();
            format!("{}{}{}", head, TRUNCATION_MARKER, tail)
        }
    };

    Truncated {
        text,
        truncated: true,
        original_chars,
    }
}

/// A module prompt with placeholders substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System prompt
    pub system: String,

    /// User prompt
    pub user: String,
}

impl RenderedPrompt {
    /// Total characters sent
    pub fn char_count(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

/// Builds the prompts for one module invocation
///
/// Recognized placeholders: `{content}`, `{schema}`, `{output_language}` and
/// `{context}` (the outputs of earlier modules for the same document, as
/// pretty JSON). Other brace groups are left untouched, and substituted text
/// is never rescanned.
pub struct PromptBuilder<'a> {
    module: &'a Module,
    content: &'a str,
    output_language: &'a str,
    context: Option<&'a Map<String, Value>>,
}

impl<'a> PromptBuilder<'a> {
    /// Create a new prompt builder
    pub fn new(module: &'a Module, content: &'a str, output_language: &'a str) -> Self {
        Self {
            module,
            content,
            output_language,
            context: None,
        }
    }

    /// Add earlier module outputs as context
    pub fn with_context(mut self, context: &'a Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Build both prompts
    pub fn build(&self) -> RenderedPrompt {
        let schema = pretty(&self.module.schema);
        let context = match self.context {
            Some(map) if !map.is_empty() => pretty(&Value::Object(map.clone())),
            _ => "{}".to_string(),
        };
        let values: [(&str, &str); 4] = [
            ("content", self.content),
            ("schema", schema.as_str()),
            ("output_language", self.output_language),
            ("context", context.as_str()),
        ];

        RenderedPrompt {
            system: substitute(&self.module.system_prompt, &values),
            user: substitute(&self.module.user_prompt, &values),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
