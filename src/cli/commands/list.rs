//! `skronk commands`
//!
//! Prints the slash-command registration payloads, as a platform adapter
//! would submit them at startup.

use std::fmt::Write as _;

use crate::cli::args::{CommandsArgs, OutputFormat};
use crate::commands::{CommandDefinition, definitions};
use crate::error::SkronkError;

/// Print every registered command.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn run(args: &CommandsArgs) -> Result<(), SkronkError> {
    let defs = definitions();
    let output = match args.format {
        OutputFormat::Human => render_human(&defs),
        OutputFormat::Json => serde_json::to_string_pretty(&defs)?,
    };
    println!("{output}");
    Ok(())
}

fn render_human(defs: &[&CommandDefinition]) -> String {
    let mut out = String::new();
    for def in defs {
        let _ = write!(out, "/{}", def.name);
        for option in def.options {
            if option.required {
                let _ = write!(out, " {}:<{:?}>", option.name, option.kind);
            } else {
                let _ = write!(out, " [{}:<{:?}>]", option.name, option.kind);
            }
        }
        let _ = writeln!(out, "\n    {}", def.description);
        for option in def.options {
            let _ = writeln!(out, "    {:<10} {}", option.name, option.description);
        }
    }
    out.trim_end().to_string()
}
