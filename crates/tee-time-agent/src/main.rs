//! Tee Time Agent entry point.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

use tee_time_agent::run_cmd::{self, RunOptions, EXIT_CONFIG, EXIT_FATAL, EXIT_OK};
use tee_time_agent::{doctor, logging, Settings};

#[derive(Parser)]
#[command(
    name = "tee-time-agent",
    about = "Fetch BRS tee sheet availability, summarise it with Ollama and push it to Telegram",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Load variables from this file instead of ./.env.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// ISO date (YYYY-MM-DD) to scrape regardless of the weekend rule.
    #[arg(long)]
    force_date: Option<String>,

    /// Days ahead of today to inspect (overrides LOOKAHEAD_DAYS).
    #[arg(long)]
    lookahead_days: Option<u32>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            force_date: args.force_date,
            lookahead_days: args.lookahead_days,
            json: args.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once (default).
    Run(RunArgs),

    /// Check configuration and Chromium availability.
    Doctor,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   tee-time-agent completions bash > ~/.local/share/bash-completion/completions/tee-time-agent
    ///   tee-time-agent completions zsh > ~/.zfunc/_tee-time-agent
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs);
    let env_file = cli.env_file.as_deref();

    let code = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tee-time-agent", &mut std::io::stdout());
            EXIT_OK
        }
        Some(Commands::Doctor) => {
            if doctor::run(env_file) {
                EXIT_OK
            } else {
                EXIT_FATAL
            }
        }
        Some(Commands::Run(args)) => run(env_file, args.into()).await,
        None => run(env_file, cli.run.into()).await,
    };

    std::process::exit(code);
}

async fn run(env_file: Option<&Path>, options: RunOptions) -> i32 {
    let settings = match Settings::load(env_file) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "settings.error");
            eprintln!("  Error: {e}");
            return EXIT_CONFIG;
        }
    };

    let result = run_cmd::run(&settings, &options).await;
    match &result {
        Ok(report) => println!("{}", run_cmd::render_report(report, options.json)),
        Err(e) => eprintln!("  Error: {e}"),
    }
    run_cmd::exit_code(&result)
}
