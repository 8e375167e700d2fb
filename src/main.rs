//! rgscope - search a directory tree with ripgrep and browse the matches.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, PoisonError};

use clap::{Args, Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rgscope::config::{AppConfig, ConfigLoader};
use rgscope::display::{self, Highlighter, TerminalObserver};
use rgscope::rg::SearchCommand;
use rgscope::search::{CaseMode, Orchestrator, Phase, SearchParameters};

#[derive(Parser)]
#[command(
    name = "rgscope",
    about = "Search a directory tree with ripgrep and browse the matches",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default locations.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search and print the result tree.
    Search {
        #[command(flatten)]
        search: SearchArgs,
        /// Show files without their matches.
        #[arg(long, conflicts_with = "expand")]
        collapse: bool,
        /// Show every file with its matches, including partial results of
        /// a stopped search.
        #[arg(long)]
        expand: bool,
        /// Do not truncate long lines.
        #[arg(long)]
        raw: bool,
    },
    /// Print the search tool command line without running it.
    Command {
        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Pattern to search for.
    pattern: String,
    /// Directory to search.
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Additional pattern, OR-combined with the main one.
    #[arg(long)]
    add_pattern: Option<String>,
    /// Treat patterns as literal text.
    #[arg(short = 'F', long)]
    fixed_strings: bool,
    #[command(flatten)]
    case: CaseArgs,
    /// Comma separated globs; prefix with '!' to exclude.
    #[arg(short = 'g', long)]
    globs: Option<String>,
    /// Search tool binary.
    #[arg(long = "rg")]
    binary: Option<PathBuf>,
}

#[derive(Args)]
#[group(multiple = false)]
struct CaseArgs {
    /// Search case sensitively.
    #[arg(short = 's', long)]
    case_sensitive: bool,
    /// Search case insensitively.
    #[arg(short = 'i', long)]
    ignore_case: bool,
    /// Ignore case unless the pattern has an uppercase letter.
    #[arg(short = 'S', long)]
    smart_case: bool,
}

impl CaseArgs {
    fn mode(&self) -> Option<CaseMode> {
        if self.case_sensitive {
            Some(CaseMode::Sensitive)
        } else if self.ignore_case {
            Some(CaseMode::Insensitive)
        } else if self.smart_case {
            Some(CaseMode::Smart)
        } else {
            None
        }
    }
}

impl SearchArgs {
    /// Apply command-line overrides on top of the configured defaults.
    fn apply(&self, config: &mut AppConfig) -> SearchParameters {
        if let Some(binary) = &self.binary {
            config.tool.binary.clone_from(binary);
        }

        let mut params = config
            .search
            .to_parameters()
            .with_target(&SearchParameters::new(&self.pattern, &self.path));
        if let Some(add) = &self.add_pattern {
            params.add_pattern.clone_from(add);
        }
        if self.fixed_strings {
            params.fixed_string = true;
        }
        if let Some(mode) = self.case.mode() {
            params.case_mode = mode;
        }
        if let Some(globs) = &self.globs {
            params.globs.clone_from(globs);
        }
        params
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// How the tree is laid out once the search settles.
#[derive(Debug, Clone, Copy)]
struct TreeView {
    collapse: bool,
    expand: bool,
    raw: bool,
}

async fn run_search(mut config: AppConfig, args: &SearchArgs, view: TreeView) -> ExitCode {
    let params = args.apply(&mut config);
    let highlighter = Highlighter::new(&params);

    let orchestrator = match Orchestrator::builder()
        .config(config.orchestrator_config())
        .observer(Arc::new(TerminalObserver))
        .build()
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let mut phases = orchestrator.phase_cell().stream();
    let printer = tokio::spawn(async move {
        while let Some(phase) = phases.next().await {
            display::print_phase(phase);
        }
    });

    tracing::info!(command = %orchestrator.command_line(&params), "Starting search");
    if let Err(e) = orchestrator.submit(params).await {
        printer.abort();
        display::print_error(&e.to_string());
        return ExitCode::FAILURE;
    }

    let phase = tokio::select! {
        phase = orchestrator.wait_idle() => phase,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel();
            orchestrator.wait_idle().await
        }
    };
    printer.abort();

    let tree = orchestrator.tree();
    let mut tree = tree.write().unwrap_or_else(PoisonError::into_inner);
    if view.collapse {
        tree.collapse_all();
    } else if view.expand {
        tree.expand_all();
    }
    display::print_tree(&tree, view.raw, highlighter.as_ref());

    match phase {
        Phase::Idle => ExitCode::SUCCESS,
        Phase::Stopped => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Search {
            search,
            collapse,
            expand,
            raw,
        } => {
            let view = TreeView {
                collapse,
                expand,
                raw,
            };
            run_search(config, &search, view).await
        }
        Commands::Command { search } => {
            let params = search.apply(&mut config);
            let command = SearchCommand::new(params).binary(config.tool.binary);
            display::print_command(&command.command_line());
            ExitCode::SUCCESS
        }
    }
}
