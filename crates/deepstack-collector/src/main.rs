//! DeepStack collector — entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use deepstack_collector::cli::collect::{self, CollectArgs};
use deepstack_collector::config::TOOL_NAME;

#[derive(Parser)]
#[command(
    name = "deepstack",
    about = "DeepStack — website technical-fingerprinting collector",
    version,
    after_help = "Without --url, targets are read from urls_to_analyze.txt (or --targets / DEEPSTACK_TARGETS)."
)]
struct Cli {
    /// Analyze a single URL instead of the target list.
    #[arg(short, long)]
    url: Option<String>,

    /// Path to the target list file.
    #[arg(long)]
    targets: Option<String>,

    /// Directory the report is written to.
    #[arg(long)]
    output_dir: Option<String>,

    /// Replace the built-in signature table with this JSON file.
    #[arg(long)]
    signatures: Option<String>,

    /// Path to a Chrome/Chromium executable.
    #[arg(long)]
    chromium: Option<String>,

    /// Show the browser window.
    #[arg(long)]
    headful: bool,

    /// Navigation timeout in seconds.
    #[arg(long)]
    nav_timeout: Option<u64>,

    /// Do not pause between targets.
    #[arg(long)]
    no_delay: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Suppress console output (logs still go to stderr).
    #[arg(long, short)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   deepstack completions bash > ~/.local/share/bash-completion/completions/deepstack
    ///   deepstack completions zsh > ~/.zfunc/_deepstack
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, TOOL_NAME, &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&cli.log_level, cli.log_json);

    let result = collect::run(CollectArgs {
        url: cli.url,
        targets: cli.targets,
        output_dir: cli.output_dir,
        signatures: cli.signatures,
        chromium: cli.chromium,
        headful: cli.headful,
        nav_timeout: cli.nav_timeout,
        no_delay: cli.no_delay,
        quiet: cli.quiet,
    })
    .await;

    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    result
}
