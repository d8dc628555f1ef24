use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use keel_core::Resource;
use keel_schema::{Table, TableSpec};
use keel_store::{Registry, State};
use tracing::info;

mod manifest;

#[derive(Parser, Debug)]
#[command(name = "keelctl", version, about = "Keel resource CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Table)]
    output: Output,

    /// Namespace (default: the kind's default namespace)
    #[arg(short = 'n', long = "namespace", global = true, env = "KEEL_NAMESPACE")]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Table, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered resource kinds
    Kinds,
    /// Show the full definition of a kind
    Definition {
        /// Type or alias, e.g. "extensions"
        kind: String,
    },
    /// Load resources from manifests and list one kind
    Get {
        /// Type or alias, e.g. "extensions"
        kind: String,
        /// Multi-document YAML manifest
        #[arg(short = 'f', long = "file", env = "KEEL_MANIFEST")]
        file: std::path::PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("KEEL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn registry() -> Result<Registry> {
    let mut reg = Registry::new();
    keel_runtime::register(&mut reg).context("registering runtime kinds")?;
    Ok(reg)
}

fn print_value<T: serde::Serialize>(output: Output, v: &T) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(v)?),
        _ => println!("{}", serde_json::to_string_pretty(v)?),
    }
    Ok(())
}

fn resource_doc(r: &dyn Resource) -> serde_json::Value {
    serde_json::json!({ "metadata": r.metadata(), "spec": r.spec_value() })
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let reg = registry()?;

    match cli.command {
        Commands::Kinds => {
            let defs: Vec<_> = reg.kinds().map(|k| k.definition().clone()).collect();
            match cli.output {
                Output::Table => {
                    let table = Table {
                        headers: vec!["TYPE".into(), "ALIASES".into(), "DEFAULT NAMESPACE".into()],
                        rows: defs.iter().map(|d| vec![d.typ.clone(), d.aliases.join(","), d.default_namespace.clone()]).collect(),
                    };
                    print!("{}", table.render());
                }
                out => print_value(out, &defs)?,
            }
        }
        Commands::Definition { kind } => {
            let def = reg.resolve(&kind)?.definition().clone();
            let out = if cli.output == Output::Table { Output::Yaml } else { cli.output };
            print_value(out, &def)?;
        }
        Commands::Get { kind, file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let state = State::new(Arc::new(reg));
            let entry = state.registry().resolve(&kind)?;
            let def = entry.definition().clone();
            let loaded = manifest::load(&state, &text, &def.typ, cli.namespace.as_deref())?;
            let ns = cli.namespace.unwrap_or_else(|| def.default_namespace.clone());
            info!(kind = %def.typ, ns = %ns, loaded, "listing resources");

            let items = state.list(&ns, &def.typ);
            match cli.output {
                Output::Table => {
                    let table = Table::build(&TableSpec::for_definition(&def), items.iter().map(|r| &**r));
                    print!("{}", table.render());
                }
                out => {
                    let docs: Vec<_> = items.iter().map(|r| resource_doc(&**r)).collect();
                    print_value(out, &docs)?;
                }
            }
        }
    }
    Ok(())
}
