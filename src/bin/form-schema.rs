//! Form Schema CLI
//!
//! Command-line interface for validating form data and linting form documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use form_schema::{
    compile, lint, load_document_auto, load_value, validate_document, FileStatus, Severity,
    ValidateError, ValidateOptions,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "form-schema")]
#[command(about = "Compile form schemas and validate form data against them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate form data against a form document
    Validate {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Form data file (JSON)
        data: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,

        /// Drop keys the schema does not describe from the output
        #[arg(long)]
        strip_unknown: bool,

        /// Stop at the first error
        #[arg(long)]
        abort_early: bool,
    },

    /// Show the fields and field dependencies a document compiles to
    Compile {
        /// Document source: file path or URL (http:// or https://)
        document: String,

        /// Form data used to choose conditional branches
        #[arg(long)]
        data: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint document files for errors (syntax, structure, unknown constraints, flow keys)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            document,
            data,
            json,
            strip_unknown,
            abort_early,
        } => {
            let options = ValidateOptions::new()
                .strip_unknown(strip_unknown)
                .abort_early(abort_early);
            run_validate(&document, &data, json, &options)
        }

        Commands::Compile {
            document,
            data,
            pretty,
        } => run_compile(&document, data.as_deref(), pretty),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_validate(
    source: &str,
    data_path: &Path,
    json_output: bool,
    options: &ValidateOptions,
) -> Result<(), u8> {
    let document = load_document_auto(source).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;

    let data = load_value(data_path).map_err(|e| {
        report_error(json_output, &format!("loading data: {}", e));
        e.exit_code() as u8
    })?;

    match validate_document(&document, &data, options) {
        Ok(value) => {
            if json_output {
                println!("{}", json!({ "valid": true, "value": value }));
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                println!("{}", json!({ "valid": false, "errors": errors }));
            } else {
                eprintln!("Validation failed:");
                for error in &errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(ValidateError::Compile(e)) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

fn run_compile(source: &str, data_path: Option<&Path>, pretty: bool) -> Result<(), u8> {
    let document = load_document_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let data = match data_path {
        Some(path) => load_value(path).map_err(|e| {
            eprintln!("Error loading data: {}", e);
            e.exit_code() as u8
        })?,
        None => Value::Null,
    };

    let compiled = compile(document.flow.as_ref(), &document.schema, &data).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let output = json!({
        "fields": compiled.keys().collect::<Vec<_>>(),
        "dependencies": compiled.dependencies,
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    println!("{}", rendered);
    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(3);
    }

    let result = lint(path, strict);

    if format == "json" {
        let rendered = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", rendered);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
