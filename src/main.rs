use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use stencil::{Config, Context, TemplateSet};
use tracing::Level;

/// Render a template to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Template source, or a path when --file is given.
    template: String,
    /// Treat TEMPLATE as a file path.
    #[arg(long)]
    file: bool,
    /// JSON object used as the render context.
    #[arg(long)]
    context: Option<String>,
    /// JSON config file.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    no_autoescape: bool,
    /// Unknown names render as empty instead of failing.
    #[arg(long)]
    allow_missing: bool,
    /// Reject templates using this filter (repeatable).
    #[arg(long = "ban-filter", value_name = "NAME")]
    ban_filter: Vec<String>,
    /// -v for debug, -vv for trace logging on stderr.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match run(args) {
        Ok(out) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(out.as_bytes()).and_then(|_| stdout.flush()) {
                eprintln!("write error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_json(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if args.no_autoescape {
        config.autoescape = false;
    }
    if args.allow_missing {
        config.allow_missing_values = true;
    }
    config.banned_filters.extend(args.ban_filter);

    let set = Arc::new(TemplateSet::new("cli", config)?);

    let (name, source) = if args.file {
        let source = std::fs::read_to_string(&args.template)?;
        (args.template, source)
    } else {
        ("<arg>".to_string(), args.template)
    };
    let template = set.from_named_string(&name, &source)?;

    let ctx = match &args.context {
        Some(json) => Context::from_json(serde_json::from_str(json)?)?,
        None => Context::new(),
    };
    Ok(template.execute(&ctx)?)
}
