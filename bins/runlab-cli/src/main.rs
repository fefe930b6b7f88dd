mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runlab-cli")]
#[command(about = "Runlab CLI - Submit, grade and validate code against a remote sandbox", long_about = None)]
struct Cli {
    /// Sandbox base URL (defaults to config/runlab.json or RUNLAB_SANDBOX_URL)
    #[arg(short, long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file and grade it against optional test cases
    Submit {
        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// JSON file with an array of test cases
        #[arg(short, long)]
        tests: Option<PathBuf>,

        /// Force a language instead of detecting it (python, javascript, java)
        #[arg(short, long)]
        language: Option<String>,

        /// Skip test cases even when a tests file is given
        #[arg(long, default_value = "false")]
        no_tests: bool,

        /// Execution timeout passed to the sandbox, in milliseconds
        #[arg(long, default_value = "10000")]
        timeout: u64,

        /// Text passed to the program as input
        #[arg(short, long, default_value = "")]
        inputs: String,
    },

    /// Run local heuristics and the remote validation check on a file
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Queue several files and drain them in fixed-size batches
    Batch {
        /// Source files, dispatched in the order given
        #[arg(short, long, required = true, num_args = 1..)]
        file: Vec<PathBuf>,

        /// Entries dispatched per tick
        #[arg(long, default_value = "5")]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let pipeline = commands::Pipeline::build(cli.server.as_deref())?;

    match cli.command {
        Commands::Submit {
            file,
            tests,
            language,
            no_tests,
            timeout,
            inputs,
        } => {
            let succeeded = pipeline
                .submit(&file, tests.as_deref(), language.as_deref(), !no_tests, timeout, inputs)
                .await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            let clean = pipeline.validate(&file).await?;
            if !clean {
                std::process::exit(1);
            }
        }
        Commands::Batch { file, batch_size } => {
            pipeline.batch(&file, batch_size).await?;
        }
    }

    Ok(())
}
