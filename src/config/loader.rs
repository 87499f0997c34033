//! Configuration loader
//!
//! Loading pipeline:
//! 1. Size check and UTF-8 BOM strip
//! 2. Environment variable expansion (pre-parse, on raw text)
//! 3. YAML parsing into the typed [`BotConfig`]
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::schema::BotConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Default maximum configuration file size (1 MiB).
pub const DEFAULT_MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Loader limits.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration size in bytes.
    pub max_config_size: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("SKRONK_MAX_CONFIG_SIZE", DEFAULT_MAX_CONFIG_SIZE),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// Validated configuration, shared read-only with the runtime.
    pub config: Arc<BotConfig>,

    /// Unset `${VAR}` references and validator warnings.
    pub warnings: Vec<LoadWarning>,
}

/// Non-fatal finding reported while loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Field path or file the warning refers to.
    pub location: Option<String>,
}

/// Reads bot configuration files.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Loader with explicit limits.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loader with limits from the environment.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Reads, substitutes, parses and validates `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or is too large
    /// - A required environment variable is unset
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        self.check_size(file_size)?;

        let raw_content = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_from_str(&raw_content, path)
    }

    /// Loads configuration from YAML text. `path` is used for messages only.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus file access.
    pub fn load_from_str(&self, raw: &str, path: &Path) -> Result<LoadResult, ConfigError> {
        self.check_size(raw.len())?;
        let mut warnings = Vec::new();

        // Handle UTF-8 BOM
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, path)?;
        warnings.extend(env_sub.warnings);

        let value: serde_yaml::Value =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        if value.is_null() {
            return Err(ConfigError::ParseError {
                path: path.to_path_buf(),
                line: None,
                message: "Configuration file is empty".to_string(),
            });
        }

        let config: BotConfig =
            serde_yaml::from_value(value).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: format!("Failed to deserialize configuration: {e}"),
            })?;

        let validation = Validator::new().validate(&config);
        if validation.has_errors() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: validation.errors,
            });
        }

        warnings.extend(validation.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }

    fn check_size(&self, size: usize) -> Result<(), ConfigError> {
        if size > self.options.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{size} bytes"),
                expected: format!("at most {} bytes", self.options.max_config_size),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// `${VAR}` expansion over raw YAML text.
///
/// Runs on raw YAML text BEFORE parsing so substituted numbers keep their
/// YAML type (`id: ${GUILD_ID}` stays an integer).
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Expands every reference in `raw_yaml`.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = Self::parse_var_spec(&mut chars, source_path)?;
                    match (std::env::var(&spec.name), spec.fallback) {
                        (Ok(value), _) => result.push_str(&value),
                        (Err(_), Fallback::Default(default)) => result.push_str(&default),
                        (Err(_), Fallback::Required(message)) => {
                            return Err(ConfigError::EnvVarNotSet {
                                var: spec.name,
                                location: message,
                            });
                        }
                        (Err(_), Fallback::Empty) => {
                            self.warnings.push(LoadWarning {
                                message: format!(
                                    "Environment variable '{}' is not set, using empty string",
                                    spec.name
                                ),
                                location: Some(source_path.display().to_string()),
                            });
                        }
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    /// Parses the inside of `${...}` up to the closing brace.
    fn parse_var_spec(chars: &mut Chars<'_>, source_path: &Path) -> Result<VarSpec, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Empty,
                    });
                }
                ':' if chars.peek() == Some(&'-') => {
                    chars.next();
                    let default = Self::read_until_close(chars, source_path)?;
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Default(default),
                    });
                }
                ':' if chars.peek() == Some(&'?') => {
                    chars.next();
                    let message = Self::read_until_close(chars, source_path)?;
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Required(message),
                    });
                }
                _ => name.push(c),
            }
        }

        Err(unclosed(source_path, &name))
    }

    /// Reads content until closing `}`, handling nested braces.
    fn read_until_close(chars: &mut Chars<'_>, source_path: &Path) -> Result<String, ConfigError> {
        let mut value = String::new();
        let mut depth = 1;

        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
            value.push(c);
        }

        Err(unclosed(source_path, &value))
    }
}

struct VarSpec {
    name: String,
    fallback: Fallback,
}

enum Fallback {
    Empty,
    Default(String),
    Required(String),
}

fn unclosed(source_path: &Path, fragment: &str) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(source_path),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{fragment}"),
    }
}

/// `name` parsed as `T`, or `default` when unset or unparseable.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{GroupId, UserId};

    const MINIMAL: &str = "bot:\n  id: 900\n  name: weezing\n";

    #[test]
    fn test_env_substitution_simple() {
        // PATH is always set on Unix/Windows
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("path: ${PATH}", Path::new("test.yaml"))
            .unwrap();
        assert!(!result.contains("${PATH}"));
        assert!(result.len() > "path: ".len());
    }

    #[test]
    fn test_env_substitution_default() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute(
                "value: ${SKRONK_TEST_NONEXISTENT_VAR_XYZ123:-60s}",
                Path::new("test.yaml"),
            )
            .unwrap();
        assert_eq!(result, "value: 60s");
    }

    #[test]
    fn test_env_substitution_required_missing() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute(
            "value: ${SKRONK_TEST_REQUIRED_XYZ123:?bot token}",
            Path::new("test.yaml"),
        );
        match result {
            Err(ConfigError::EnvVarNotSet { var, location }) => {
                assert_eq!(var, "SKRONK_TEST_REQUIRED_XYZ123");
                assert_eq!(location, "bot token");
            }
            other => panic!("Expected EnvVarNotSet error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_substitution_escaped_dollar() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("reply: pay $$5", Path::new("test.yaml"))
            .unwrap();
        assert_eq!(result, "reply: pay $5");
    }

    #[test]
    fn test_env_substitution_missing_warning() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("value: ${SKRONK_TEST_WARN_XYZ123}", Path::new("test.yaml"))
            .unwrap();
        assert_eq!(result, "value: ");
        assert_eq!(sub.warnings.len(), 1);
        assert!(sub.warnings[0].message.contains("SKRONK_TEST_WARN_XYZ123"));
    }

    #[test]
    fn test_env_substitution_unclosed() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute("value: ${OOPS", Path::new("test.yaml"));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_lone_dollar_is_kept() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute("reply: $5", Path::new("test.yaml")).unwrap();
        assert_eq!(result, "reply: $5");
    }

    #[test]
    fn load_minimal_config() {
        let result = ConfigLoader::with_defaults()
            .load_from_str(MINIMAL, Path::new("bot.yaml"))
            .unwrap();
        assert_eq!(result.config.bot.id, UserId(900));
    }

    #[test]
    fn load_strips_bom() {
        let raw = format!("\u{feff}{MINIMAL}");
        assert!(
            ConfigLoader::with_defaults()
                .load_from_str(&raw, Path::new("bot.yaml"))
                .is_ok()
        );
    }

    #[test]
    fn load_substitutes_typed_values() {
        let raw = "bot: { id: 900, name: weezing }\nguilds:\n  - id: ${SKRONK_TEST_GUILD_XYZ:-42}\n    name: g\n";
        let result = ConfigLoader::with_defaults()
            .load_from_str(raw, Path::new("bot.yaml"))
            .unwrap();
        assert_eq!(result.config.guilds[0].id, GroupId(42));
    }

    #[test]
    fn load_rejects_empty_file() {
        let err = ConfigLoader::with_defaults()
            .load_from_str("", Path::new("bot.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn load_rejects_oversized_input() {
        let loader = ConfigLoader::new(LoaderOptions {
            max_config_size: 8,
        });
        let err = loader
            .load_from_str(MINIMAL, Path::new("bot.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "file_size"));
    }

    #[test]
    fn load_reports_validation_errors() {
        let raw = "bot: { id: 900, name: weezing }\npenalty:\n  default_timeout: never\n";
        let err = ConfigLoader::with_defaults()
            .load_from_str(raw, Path::new("bot.yaml"))
            .unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert!(errors.iter().any(|e| e.path == "penalty.default_timeout"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_file() {
        let err = ConfigLoader::with_defaults()
            .load(Path::new("/definitely/not/here.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_loader_options_default() {
        assert_eq!(LoaderOptions::default().max_config_size, DEFAULT_MAX_CONFIG_SIZE);
    }
}
