use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use json_patch::PatchOperation;
use serde_json::Value as Json;
use tracing_subscriber::EnvFilter;

use formulary::{Config, Engine, LinkRegistry, TypeContract};

#[derive(Parser)]
#[command(name = "formulary", version, about = "Evaluate schema formulas and synthesize link triggers")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Link constraints (JSON array)
    #[arg(long, global = true, value_name = "FILE")]
    links: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the formulas a schema declares
    Formulas { schema: PathBuf },

    /// Evaluate a single formula
    Eval {
        formula: String,
        /// Document bound to the document key
        #[arg(long, value_name = "FILE")]
        document: Option<PathBuf>,
        /// Inline JSON bound to `input`
        #[arg(long, value_name = "JSON")]
        input: Option<String>,
    },

    /// Fill in the computed fields of a document
    Object { schema: PathBuf, document: PathBuf },

    /// Apply a JSON patch and return it with computed fields corrected
    Patch {
        schema: PathBuf,
        document: PathBuf,
        patch: PathBuf,
    },

    /// List the link verbs a type's formulas read
    Verbs {
        #[arg(value_name = "TYPE")]
        contract: PathBuf,
    },

    /// Synthesize re-evaluation triggers for a type
    Triggers {
        #[arg(value_name = "TYPE")]
        contract: PathBuf,
    },

    /// Evaluate formulas interactively
    #[cfg(feature = "readline")]
    Repl {
        #[arg(long, value_name = "FILE")]
        document: Option<PathBuf>,
    },
}

type CliResult<T> = Result<T, Box<dyn StdError>>;

fn read_json(path: &Path) -> CliResult<Json> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?)
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn engine(cli: &Cli) -> CliResult<Engine> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let links = match &cli.links {
        Some(path) => LinkRegistry::load(path)?,
        None => LinkRegistry::default(),
    };
    Ok(Engine::with_config(config).with_links(links))
}

fn run(cli: Cli) -> CliResult<()> {
    let engine = engine(&cli)?;

    match cli.command {
        Command::Formulas { schema } => {
            let formulas = engine.formulas(&read_json(&schema)?);
            print_json(&formulas.to_vec())
        }
        Command::Eval {
            formula,
            document,
            input,
        } => {
            let document = match document {
                Some(path) => read_json(&path)?,
                None => Json::Object(Default::default()),
            };
            let input = match input {
                Some(text) => serde_json::from_str(&text)?,
                None => Json::Null,
            };
            print_json(&engine.evaluate(&formula, &document, &input)?)
        }
        Command::Object { schema, document } => {
            let mut document = read_json(&document)?;
            engine.evaluate_object(&read_json(&schema)?, &mut document);
            print_json(&document)
        }
        Command::Patch {
            schema,
            document,
            patch,
        } => {
            let operations: Vec<PatchOperation> = serde_json::from_value(read_json(&patch)?)?;
            let corrected = engine.evaluate_patch(&read_json(&schema)?, &read_json(&document)?, &operations);
            print_json(&corrected)
        }
        Command::Verbs { contract } => {
            let contract: TypeContract = serde_json::from_value(read_json(&contract)?)?;
            print_json(&engine.link_verbs(&contract.data.schema))
        }
        Command::Triggers { contract } => {
            let contract: TypeContract = serde_json::from_value(read_json(&contract)?)?;
            print_json(&engine.type_triggers(&contract))
        }
        #[cfg(feature = "readline")]
        Command::Repl { document } => {
            let document = match document {
                Some(path) => read_json(&path)?,
                None => Json::Object(Default::default()),
            };
            repl::run(&engine, &document)
        }
    }
}

#[cfg(feature = "readline")]
mod repl {
    use std::time::Instant;

    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use serde_json::Value as Json;

    use formulary::{Engine, Formula};

    const HISTORY: &str = "history.txt";

    fn doit(engine: &Engine, document: &Json, l: &str) {
        let formula = match Formula::compile(l.trim()) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}", e);
                return;
            }
        };
        println!("Code: {}", formula);

        let start = Instant::now();
        match engine.evaluate_formula(&formula, document, &Json::Null) {
            Ok(result) => println!("{}", result.value),
            Err(e) => eprintln!("Error: {}", e),
        }
        println!("Took {:?}", start.elapsed());
    }

    pub fn run(engine: &Engine, document: &Json) -> super::CliResult<()> {
        let mut rl = DefaultEditor::new()?;
        if rl.load_history(HISTORY).is_err() {}

        loop {
            match rl.readline(">> ") {
                Ok(l) => {
                    let _ = rl.add_history_entry(l.as_str());
                    doit(engine, document, &l);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        rl.save_history(HISTORY)?;
        Ok(())
    }
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
