use std::path::PathBuf;

use clap::{Parser, Subcommand};

use odin::config::EngineConfig;
use odin::worker::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "odin", version, about = "AI-assisted batch decompilation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Concurrently decompile a project using an AI model via LiteLLM.
    DecompileProject {
        /// Input directory containing assembly files.
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for decompiled source files.
        #[arg(short, long, default_value = "decompiled")]
        output_dir: PathBuf,

        /// Number of concurrent workers.
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Number of tasks to process in a batch.
        #[arg(short, long, default_value_t = 10)]
        batch_size: usize,

        /// LiteLLM API endpoint URL.
        #[arg(long, default_value = "http://localhost:4000/v1/chat/completions")]
        litellm_url: String,

        /// AI model to use for decompilation.
        #[arg(long, default_value = "ollama/codellama")]
        model: String,

        /// Maximum number of retries for a failed task.
        #[arg(long, default_value_t = 3)]
        max_retries: u32,

        /// Path to the SQLite database file.
        #[arg(long, default_value = "decompile.db")]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match cli.command {
        Command::DecompileProject {
            input,
            output_dir,
            concurrency,
            batch_size,
            litellm_url,
            model,
            max_retries,
            db,
        } => EngineConfig {
            input_dir: input,
            output_dir,
            concurrency,
            batch_size,
            litellm_url,
            model,
            max_retries,
            db_path: db,
        },
    };

    eprintln!("Starting Odin Decompilation Engine...");
    eprintln!("Configuration:");
    eprintln!("  - Input Directory: {}", config.input_dir.display());
    eprintln!("  - Output Directory: {}", config.output_dir.display());
    eprintln!("  - Concurrency: {}", config.concurrency);
    eprintln!("  - Batch Size: {}", config.batch_size);
    eprintln!("  - Database Path: {}", config.db_path.display());
    eprintln!("------------------------------------");

    if let Err(e) = Supervisor::new(config).run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
