//! Output formatting for the CLI.

use colored::*;
use folio_domain::{ErrorEntry, Template};
use std::path::Path;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Longest error message shown in a table cell
const MESSAGE_WIDTH: usize = 60;

/// Output formatter.
pub struct Formatter {
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(color_enabled: bool) -> Self {
        Self { color_enabled }
    }

    /// Format templates as a table.
    pub fn format_templates(&self, templates: &[Template]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Name", "Modules", "Description"]);
        for template in templates {
            builder.push_record([
                template.name.clone(),
                template.module_names().join(", "),
                template.description.clone(),
            ]);
        }
        self.table(builder)
    }

    /// Format one template's modules in detail.
    pub fn format_template_detail(&self, template: &Template) -> String {
        let mut builder = Builder::default();
        builder.push_record(["#", "Module", "Required fields", "Prompt hash"]);
        for (index, module) in template.modules.iter().enumerate() {
            let hash = module.prompt_hash();
            builder.push_record([
                (index + 1).to_string(),
                module.name.clone(),
                module.required_fields().join(", "),
                hash.chars().take(12).collect(),
            ]);
        }
        format!("{}\n{}", self.colorize(&template.name, "cyan"), self.table(builder))
    }

    /// Format this run's failures as a table.
    pub fn format_failures(&self, failures: &[ErrorEntry]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Document", "Module", "Error", "Message"]);
        for entry in failures {
            let document = Path::new(&entry.source_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.source_path.clone());
            builder.push_record([
                document,
                entry.stage_name.clone(),
                entry.error_type.to_string(),
                shorten(&entry.error_message, MESSAGE_WIDTH),
            ]);
        }
        self.table(builder)
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

fn shorten(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= width {
        return line.to_string();
    }
    let cut: String = line.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}
