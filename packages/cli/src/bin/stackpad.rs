use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;

mod cli;

use cli::parse::GrammarArg;

#[derive(Parser)]
#[command(name = "stackpad")]
#[command(about = "Stackpad CLI - parse model output and run generated projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a model response and print the extracted artifact
    Parse {
        /// File holding the raw model output
        file: PathBuf,
        /// Tag vocabulary used by the response
        #[arg(long, value_enum, default_value = "artifact")]
        grammar: GrammarArg,
        /// Replay the file in chunks of this many characters and print file progress
        #[arg(long)]
        chunk: Option<usize>,
    },
    /// Apply a model response to a project and run it in a local sandbox
    Run {
        /// File holding the raw model output
        file: PathBuf,
        /// Project to apply the files to (defaults to a slug of the artifact title)
        #[arg(short, long)]
        project: Option<String>,
        /// Directory holding saved projects
        #[arg(long)]
        store: Option<PathBuf>,
        /// Tag vocabulary used by the response
        #[arg(long, value_enum, default_value = "artifact")]
        grammar: GrammarArg,
        /// Watch the sandbox for file changes while running
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::init_tracing();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Parse {
            file,
            grammar,
            chunk,
        } => cli::parse::parse_command(&file, grammar, chunk),
        Commands::Run {
            file,
            project,
            store,
            grammar,
            watch,
        } => {
            cli::run::run_command(cli::run::RunOptions {
                file,
                project,
                store,
                grammar,
                watch,
            })
            .await
        }
    }
}
