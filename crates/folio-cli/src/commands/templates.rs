//! Templates command implementation.

use crate::cli::TemplatesArgs;
use crate::error::Result;
use crate::output::Formatter;
use folio_extractor::{builtin, builtin_names, resolve_template};

/// Execute the templates command.
pub async fn execute_templates(args: TemplatesArgs, formatter: &Formatter) -> Result<()> {
    match args.template {
        Some(reference) => {
            let template = resolve_template(&reference)?;
            println!("{}", formatter.format_template_detail(&template));
        }
        None => {
            let templates: Vec<_> = builtin_names().into_iter().filter_map(builtin).collect();
            println!("{}", formatter.format_templates(&templates));
        }
    }
    Ok(())
}
