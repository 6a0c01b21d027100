//! weft CLI - transform directive-annotated sources

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weft_core::{Engine, FsLoader, Value, compile};

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(version)]
#[command(about = "Directive-based source preprocessor", long_about = None)]
struct Args {
    /// Input file to transform
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Write output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Bind NAME in the scope; VALUE is parsed as JSON, falling back to
    /// a plain string. A bare NAME binds true.
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// JSON object file with scope bindings (applied before -D)
    #[arg(long, value_name = "FILE")]
    defines_file: Option<PathBuf>,

    /// Print the compiled meta program instead of transforming
    #[arg(
        long,
        value_name = "FORMAT",
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "text"
    )]
    dump_program: Option<DumpFormat>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_filter = match args.verbose {
        0 => "weft=warn",
        1 => "weft=debug",
        _ => "weft=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input {:?}", args.input))?;

    if let Some(format) = args.dump_program {
        let program = compile(&source)?;
        let rendered = match format {
            DumpFormat::Text => weft_core::diagnostics::render_listing(&program, None),
            DumpFormat::Json => serde_json::to_string_pretty(&program)
                .context("failed to serialize meta program")?,
        };
        println!("{rendered}");
        return Ok(());
    }

    let scope = build_scope(&args)?;
    debug!(bindings = scope.len(), input = ?args.input, "transforming");

    let filename = args.input.to_string_lossy().into_owned();
    let engine = Engine::new(FsLoader);
    let output = match engine.transform(&source, &filename, scope) {
        Ok(output) => output,
        Err(err) => {
            // The fault carries its own annotated program listing
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    match &args.output {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("failed to write output {path:?}"))?,
        None => print!("{output}"),
    }
    Ok(())
}

/// Build the initial scope from --defines-file and -D pairs, later
/// bindings winning.
fn build_scope(args: &Args) -> Result<Vec<(String, Value)>> {
    let mut scope = Vec::new();

    if let Some(path) = &args.defines_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read defines file {path:?}"))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("defines file {path:?} is not valid JSON"))?;
        let serde_json::Value::Object(entries) = json else {
            anyhow::bail!("defines file {path:?} must contain a JSON object");
        };
        for (name, value) in &entries {
            scope.push((name.clone(), Value::from_json(value)));
        }
    }

    for define in &args.defines {
        scope.push(parse_define(define));
    }
    Ok(scope)
}

/// Parse one `-D` argument. `NAME=VALUE` parses VALUE as JSON with a
/// plain-string fallback; a bare `NAME` binds true.
fn parse_define(define: &str) -> (String, Value) {
    match define.split_once('=') {
        None => (define.to_string(), Value::Bool(true)),
        Some((name, raw)) => {
            let value = match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(json) => Value::from_json(&json),
                Err(_) => Value::Str(raw.to_string()),
            };
            (name.to_string(), value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define_forms() {
        assert_eq!(parse_define("FLAG"), ("FLAG".to_string(), Value::Bool(true)));
        assert_eq!(
            parse_define("N=3"),
            ("N".to_string(), Value::Number(3.0))
        );
        assert_eq!(
            parse_define("V=\"1.2\""),
            ("V".to_string(), Value::Str("1.2".to_string()))
        );
        // Not valid JSON: taken as a plain string
        assert_eq!(
            parse_define("NAME=release build"),
            ("NAME".to_string(), Value::Str("release build".to_string()))
        );
    }
}
