// crates/control-path-cli/src/main.rs
// ============================================================================
// Module: Control Path CLI Entry Point
// Description: Thin command wrapper over the evaluation core.
// Purpose: Validate, describe, and evaluate artifacts from the shell.
// Dependencies: clap, control-path-core, control-path-resolver, control-path-transport
// ============================================================================

//! ## Overview
//! The CLI is an informational wrapper: `validate` and `describe` decode an
//! artifact from a path or URL, `evaluate` resolves one flag against a
//! JSON context. Exit codes: 0 success, 1 validation failure, 2 transport
//! failure. All command output is JSON on stdout.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "Producing shell output is the purpose of this binary."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use control_path_core::ArtifactError;
use control_path_core::ArtifactSummary;
use control_path_core::DecodeOptions;
use control_path_core::KeyMaterial;
use control_path_core::MAX_ARTIFACT_BYTES;
use control_path_core::decode_artifact;
use control_path_resolver::LoadError;
use control_path_resolver::LoadOptions;
use control_path_resolver::OverrideSource;
use control_path_resolver::Resolver;
use control_path_resolver::ResolverConfig;
use control_path_transport::ARTIFACT_TIMEOUT_CAP;
use control_path_transport::ARTIFACT_TIMEOUT_DEFAULT;
use control_path_transport::FetchOutcome;
use control_path_transport::FetchRequest;
use control_path_transport::TransportError;
use control_path_transport::fetch_url;
use control_path_transport::is_http_url;
use control_path_transport::read_file_limited;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Everything succeeded.
const EXIT_OK: u8 = 0;
/// Artifact or input validation failed.
const EXIT_VALIDATION: u8 = 1;
/// A file or URL load failed.
const EXIT_TRANSPORT: u8 = 2;

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// Control Path artifact tooling.
#[derive(Debug, Parser)]
#[command(name = "control-path", version, about = "Control Path evaluation core CLI")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Decode and validate an artifact, enforcing signature policy.
    Validate {
        /// Artifact file path or HTTP(S) URL.
        location: String,
        /// Verification key as base64 or hex text.
        #[arg(long)]
        public_key: Option<String>,
        /// Reject artifacts without a signature.
        #[arg(long)]
        require_signature: bool,
        /// Directory constraining file loads.
        #[arg(long)]
        allowed_directory: Option<PathBuf>,
    },
    /// Print an artifact summary.
    Describe {
        /// Artifact file path or HTTP(S) URL.
        location: String,
    },
    /// Resolve one flag against a JSON context.
    Evaluate {
        /// Flag name to resolve.
        flag: String,
        /// Artifact file path or HTTP(S) URL.
        #[arg(long)]
        artifact: String,
        /// Requested value type.
        #[arg(long, value_enum, default_value = "bool")]
        kind: Kind,
        /// Default value, interpreted per the requested type.
        #[arg(long)]
        default: Option<String>,
        /// Evaluation context as a JSON object.
        #[arg(long)]
        context: Option<String>,
        /// Override file path or HTTP(S) URL applied before rules.
        #[arg(long)]
        overrides: Option<String>,
    },
}

/// Requested resolution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    /// Boolean resolution.
    Bool,
    /// String resolution.
    String,
    /// Number resolution.
    Number,
    /// Structured-value resolution.
    Object,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Validate {
            location,
            public_key,
            require_signature,
            allowed_directory,
        } => run_validate(&location, public_key, require_signature, allowed_directory.as_deref()),
        Command::Describe {
            location,
        } => run_describe(&location),
        Command::Evaluate {
            flag,
            artifact,
            kind,
            default,
            context,
            overrides,
        } => run_evaluate(&flag, &artifact, kind, default.as_deref(), context.as_deref(), overrides),
    };
    ExitCode::from(code)
}

// ============================================================================
// SECTION: Validate and Describe
// ============================================================================

/// Runs `validate`: decode under signature policy and report.
fn run_validate(
    location: &str,
    public_key: Option<String>,
    require_signature: bool,
    allowed_directory: Option<&std::path::Path>,
) -> u8 {
    let options = DecodeOptions {
        public_key: public_key.map(KeyMaterial::Text),
        require_signature,
    };
    match load_summary(location, &options, allowed_directory) {
        Ok(summary) => {
            print_json(&json!({"status": "ok", "artifact": summary}));
            EXIT_OK
        }
        Err(code) => code,
    }
}

/// Runs `describe`: decode without signature policy and print the summary.
fn run_describe(location: &str) -> u8 {
    match load_summary(location, &DecodeOptions::default(), None) {
        Ok(summary) => {
            print_json(&json!({"artifact": summary}));
            EXIT_OK
        }
        Err(code) => code,
    }
}

/// Loads and decodes an artifact, reporting failures on stderr.
fn load_summary(
    location: &str,
    options: &DecodeOptions,
    allowed_directory: Option<&std::path::Path>,
) -> Result<ArtifactSummary, u8> {
    let bytes = fetch_bytes(location, allowed_directory).map_err(|err| {
        eprintln!("{err}");
        EXIT_TRANSPORT
    })?;
    let artifact = decode_artifact(&bytes, options).map_err(|err| {
        eprintln!("{err}");
        EXIT_VALIDATION
    })?;
    Ok(artifact.summary())
}

/// Reads artifact bytes from a file path or URL.
fn fetch_bytes(
    location: &str,
    allowed_directory: Option<&std::path::Path>,
) -> Result<Vec<u8>, TransportError> {
    if is_http_url(location) {
        let request = FetchRequest {
            url: location,
            timeout: ARTIFACT_TIMEOUT_DEFAULT.min(ARTIFACT_TIMEOUT_CAP),
            max_bytes: MAX_ARTIFACT_BYTES,
            etag: None,
            expected_content_types: &["application/octet-stream", "application/x-msgpack"],
        };
        return match fetch_url(&request)? {
            FetchOutcome::Fetched(payload) => Ok(payload.bytes),
            FetchOutcome::NotModified => Err(TransportError::Failed(
                "unexpected 304 for unconditional artifact fetch".to_string(),
            )),
        };
    }
    read_file_limited(location, MAX_ARTIFACT_BYTES, allowed_directory)
}

// ============================================================================
// SECTION: Evaluate
// ============================================================================

/// Runs `evaluate`: load, optionally apply overrides, resolve one flag.
fn run_evaluate(
    flag: &str,
    artifact: &str,
    kind: Kind,
    default: Option<&str>,
    context: Option<&str>,
    overrides: Option<String>,
) -> u8 {
    let context = match context.map_or(Ok(Value::Object(serde_json::Map::new())), parse_json) {
        Ok(value) => value,
        Err(message) => {
            eprintln!("invalid --context: {message}");
            return EXIT_VALIDATION;
        }
    };
    let config = ResolverConfig {
        override_source: overrides.as_deref().map(OverrideSource::from_location),
        ..ResolverConfig::default()
    };
    let resolver = Resolver::new(config);
    if let Err(err) = resolver.load_artifact(artifact, &LoadOptions::default()) {
        eprintln!("{err}");
        return exit_code_for(&err);
    }
    if overrides.is_some()
        && let Err(err) = resolver.load_overrides()
    {
        eprintln!("{err}");
        return exit_code_for(&err);
    }
    let rendered = match kind {
        Kind::Bool => {
            let fallback = default.is_some_and(|d| d.eq_ignore_ascii_case("true"));
            serde_json::to_value(resolver.resolve_boolean(flag, fallback, &context))
        }
        Kind::String => {
            let fallback = default.unwrap_or_default();
            serde_json::to_value(resolver.resolve_string(flag, fallback, &context))
        }
        Kind::Number => {
            let fallback = default.and_then(|d| d.parse::<f64>().ok()).unwrap_or(0.0);
            serde_json::to_value(resolver.resolve_number(flag, fallback, &context))
        }
        Kind::Object => {
            let fallback = match default.map_or(Ok(Value::Null), parse_json) {
                Ok(value) => value,
                Err(message) => {
                    eprintln!("invalid --default: {message}");
                    return EXIT_VALIDATION;
                }
            };
            serde_json::to_value(resolver.resolve_object(flag, &fallback, &context))
        }
    };
    match rendered {
        Ok(details) => {
            print_json(&details);
            EXIT_OK
        }
        Err(err) => {
            eprintln!("failed to render resolution: {err}");
            EXIT_VALIDATION
        }
    }
}

/// Maps a load error onto the exit-code surface.
fn exit_code_for(error: &LoadError) -> u8 {
    match error {
        LoadError::Transport(_) => EXIT_TRANSPORT,
        LoadError::Artifact(ArtifactError::Invalid(_) | ArtifactError::Signature(_))
        | LoadError::Override(_) => EXIT_VALIDATION,
    }
}

/// Parses a JSON argument string.
fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|err| err.to_string())
}

/// Prints a value as pretty JSON on stdout.
fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{value}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::missing_docs_in_private_items,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use clap::Parser;
    use control_path_core::ArtifactError;

    use super::Cli;
    use super::Command;
    use super::EXIT_TRANSPORT;
    use super::EXIT_VALIDATION;
    use super::Kind;
    use super::LoadError;
    use super::TransportError;
    use super::exit_code_for;
    use super::parse_json;

    #[test]
    fn transport_failures_exit_with_two() {
        let err = LoadError::Transport(TransportError::Failed("boom".to_string()));
        assert_eq!(exit_code_for(&err), EXIT_TRANSPORT);
    }

    #[test]
    fn validation_failures_exit_with_one() {
        let err = LoadError::Artifact(ArtifactError::Invalid("bad".to_string()));
        assert_eq!(exit_code_for(&err), EXIT_VALIDATION);
    }

    #[test]
    fn json_arguments_parse_or_report() {
        assert!(parse_json(r#"{"role": "admin"}"#).is_ok());
        assert!(parse_json("{nope").is_err());
    }

    #[test]
    fn evaluate_arguments_parse_into_the_expected_command() {
        let cli = Cli::parse_from([
            "control-path",
            "evaluate",
            "new_dashboard",
            "--artifact",
            "artifact.bin",
            "--kind",
            "string",
            "--context",
            r#"{"role": "admin"}"#,
        ]);
        let Command::Evaluate {
            flag,
            kind,
            ..
        } = cli.command
        else {
            panic!("expected evaluate command");
        };
        assert_eq!(flag, "new_dashboard");
        assert_eq!(kind, Kind::String);
    }
}
