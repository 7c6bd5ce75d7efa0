use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use filter_expr::{
    Value,
    options::QueryOptions,
    parser::Condition,
    schema::FieldSchema,
    translate::{Backend, Dispatcher, TranslatedFilter},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Reads conditions from stdin, one JSON array per line
///  (`["num > ? AND text like ?", 5, "%foo%"]`), and prints what each backend
///  would receive.
#[derive(Parser)]
#[command(name = "filter_check")]
#[command(version)]
struct Cli {
    /// Backend to translate for: jig/flat_file, sql/relational, mongo/document
    #[arg(short, long, default_value = "flat_file")]
    backend: Backend,

    /// JSON file with the field configuration
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Sort order to translate alongside every filter, e.g. "title, num desc"
    #[arg(short, long)]
    order: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_filter(filter: &TranslatedFilter) {
    match filter {
        TranslatedFilter::FlatFile { expression, values } => {
            println!("{expression}  {}", values_json(values));
        }
        TranslatedFilter::Relational { template, values } => {
            println!("{template}  {}", values_json(values));
        }
        TranslatedFilter::Document(doc) => println!("{doc}"),
    }
}

fn values_json(values: &[Value]) -> String {
    serde_json::to_string(values).unwrap_or_else(|e| format!("<{e}>"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let schema = match &cli.schema {
        None => FieldSchema::new(),
        Some(path) => match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| FieldSchema::from_json(&json).map_err(|e| e.to_string()))
        {
            Ok(schema) => schema,
            Err(e) => {
                eprintln!("Can't load schema from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
    };
    let dispatcher = Dispatcher::new(cli.backend, &schema);

    if let Some(order) = &cli.order {
        let options = QueryOptions::new().with_order(order.as_str());
        match dispatcher.prepare_options(Some(&options)) {
            Ok(translated) => println!("order: {:?}", translated.and_then(|o| o.order)),
            Err(e) => {
                eprintln!("Error translating order: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    for line in std::io::stdin().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let now = std::time::Instant::now();
        let res = serde_json::from_str::<Vec<Value>>(&line)
            .map_err(|e| e.to_string())
            .and_then(|items| Condition::from_array(items).map_err(|e| e.to_string()))
            .and_then(|cond| {
                dispatcher
                    .prepare_filter(Some(&cond))
                    .map_err(|e| e.to_string())
            });
        print!("[in {}μs] ", now.elapsed().as_micros());
        match res {
            Err(e) => println!("Error translating input: {e}"),
            Ok(None) => println!("no filter"),
            Ok(Some(filter)) => print_filter(&filter),
        }
    }
    ExitCode::SUCCESS
}
