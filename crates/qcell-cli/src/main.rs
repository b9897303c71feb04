//! qcell CLI - run dataflow cells from the command line.

mod catalog;
mod colors;
mod eval;
mod run;
mod show;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use qcell_core::QcellDirs;

#[derive(Parser)]
#[command(name = "qcell")]
#[command(about = "Run qcell dataflow cells outside a node-graph host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered cells
    List {
        /// Only cells in this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show the sockets and flows of a cell
    Describe {
        /// Cell name, e.g. Read_CSV
        cell: String,
    },

    /// Evaluate an arithmetic expression
    Eval {
        /// Expression, e.g. "t**2 + 1"
        expr: String,

        /// Placeholder substituted by each value
        #[arg(long, default_value = "t")]
        var: String,

        /// Comma-separated values to substitute for the placeholder
        #[arg(long)]
        values: Option<String>,
    },

    /// Process one cell
    Run {
        /// Cell name
        cell: String,

        /// Input assignment as name=<json>; repeatable
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Store root (default: ./.qcell/store)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Worker timeout in seconds; 0 waits forever
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Print a stored table
    Show {
        /// File part of the table key
        file: String,

        /// Node part of the table key
        node: String,

        /// Row range, e.g. 10..20
        #[arg(long)]
        rows: Option<String>,

        /// Only this column
        #[arg(long)]
        column: Option<String>,

        /// Store root (default: ./.qcell/store)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { category } => catalog::list(category.as_deref())?,

        Commands::Describe { cell } => catalog::describe(&cell)?,

        Commands::Eval { expr, var, values } => eval::execute(&expr, &var, values.as_deref())?,

        Commands::Run {
            cell,
            inputs,
            store,
            timeout,
        } => {
            let store = store_root(store)?;
            run::execute(&cell, &inputs, &store, timeout)?;
        }

        Commands::Show {
            file,
            node,
            rows,
            column,
            store,
            json,
        } => {
            let store = store_root(store)?;
            show::execute(&file, &node, &store, rows.as_deref(), column.as_deref(), json)?;
        }
    }

    Ok(())
}

/// The explicit store root, or `.qcell/store` under the working directory.
fn store_root(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(root) => Ok(root),
        None => Ok(QcellDirs::from_workdir(&std::env::current_dir()?)?.store_dir),
    }
}
