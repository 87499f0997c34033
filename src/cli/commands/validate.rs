//! `skronk validate`
//!
//! Loads each file through the same pipeline `serve` uses and reports every
//! issue found. With `--strict`, warnings fail validation too.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::{ConfigLoader, LoadWarning};
use crate::error::{ConfigError, Severity, SkronkError, ValidationIssue};

/// Validation outcome for one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

/// Validate configuration files without starting the bot.
///
/// # Errors
///
/// Returns an I/O error if any file does not exist, or a config error
/// for the first file that fails validation.
pub fn run(args: &ValidateArgs) -> Result<(), SkronkError> {
    let loader = ConfigLoader::with_defaults();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_failure: Option<ConfigError> = None;

    for path in &args.files {
        if !path.exists() {
            return Err(SkronkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        tracing::info!(file = %path.display(), "validating configuration");

        let (report, failure) = check(&loader, path, args.strict);
        if report.valid {
            tracing::info!(file = %path.display(), "configuration valid");
        }
        if first_failure.is_none() {
            first_failure = failure;
        }
        reports.push(report);
    }

    let output = match args.format {
        OutputFormat::Human => render_human(&reports),
        OutputFormat::Json => serde_json::to_string_pretty(&reports)?,
    };
    println!("{output}");

    first_failure.map_or(Ok(()), |e| Err(e.into()))
}

fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> (FileReport, Option<ConfigError>) {
    let file = path.display().to_string();
    match loader.load(path) {
        Ok(result) => {
            let warnings: Vec<ValidationIssue> =
                result.warnings.iter().map(warning_issue).collect();
            let failure = (strict && !warnings.is_empty()).then(|| ConfigError::ValidationError {
                path: file.clone(),
                errors: warnings
                    .iter()
                    .cloned()
                    .map(|w| ValidationIssue {
                        severity: Severity::Error,
                        ..w
                    })
                    .collect(),
            });
            let report = FileReport {
                file,
                valid: failure.is_none(),
                errors: Vec::new(),
                warnings,
            };
            (report, failure)
        }
        Err(ConfigError::ValidationError { path, errors }) => {
            let report = FileReport {
                file,
                valid: false,
                errors: errors.clone(),
                warnings: Vec::new(),
            };
            (report, Some(ConfigError::ValidationError { path, errors }))
        }
        Err(other) => {
            let report = FileReport {
                file,
                valid: false,
                errors: vec![ValidationIssue {
                    path: String::new(),
                    message: other.to_string(),
                    severity: Severity::Error,
                }],
                warnings: Vec::new(),
            };
            (report, Some(other))
        }
    }
}

fn warning_issue(warning: &LoadWarning) -> ValidationIssue {
    ValidationIssue {
        path: warning.location.clone().unwrap_or_default(),
        message: warning.message.clone(),
        severity: Severity::Warning,
    }
}

fn render_human(reports: &[FileReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let status = if report.valid { "ok" } else { "FAILED" };
        let _ = writeln!(out, "{}: {status}", report.file);
        for issue in report.errors.iter().chain(&report.warnings) {
            let _ = writeln!(out, "  {issue}");
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const VALID: &str = "bot: { id: 900, name: w }\nguilds:\n  - { id: 1, name: g, roles: [{ id: 10, name: SKRONK'd }] }\n";
    const WARNS: &str = "bot: { id: 900, name: w }\nguilds:\n  - { id: 1, name: g, roles: [{ id: 10, name: muted }] }\n";

    #[test]
    fn valid_file_passes() {
        let f = file(VALID);
        let (report, failure) = check(&ConfigLoader::with_defaults(), f.path(), true);
        assert!(report.valid);
        assert!(failure.is_none());
    }

    #[test]
    fn warnings_fail_only_in_strict_mode() {
        let f = file(WARNS);
        let loader = ConfigLoader::with_defaults();

        let (report, failure) = check(&loader, f.path(), false);
        assert!(report.valid);
        assert!(failure.is_none());
        assert_eq!(report.warnings.len(), 1);

        let (report, failure) = check(&loader, f.path(), true);
        assert!(!report.valid);
        let Some(ConfigError::ValidationError { errors, .. }) = failure else {
            panic!("expected validation error");
        };
        assert!(errors.iter().all(|e| e.severity == Severity::Error));
    }

    #[test]
    fn invalid_file_reports_errors() {
        let f = file("bot: { id: 900, name: '' }\n");
        let (report, failure) = check(&ConfigLoader::with_defaults(), f.path(), false);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.path == "bot.name"));
        assert!(failure.is_some());
        assert!(render_human(&[report]).contains("FAILED"));
    }

    #[test]
    fn parse_error_is_reported() {
        let f = file("bot: [unterminated\n");
        let (report, failure) = check(&ConfigLoader::with_defaults(), f.path(), false);
        assert!(!report.valid);
        assert!(matches!(failure, Some(ConfigError::ParseError { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let args = ValidateArgs {
            files: vec!["/nonexistent/skronk.yaml".into()],
            format: OutputFormat::Human,
            strict: false,
        };
        let err = run(&args).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::ExitCode::IO_ERROR);
    }
}
