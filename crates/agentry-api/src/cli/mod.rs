//! CLI command definitions and dispatch for the `agentry` binary.
//!
//! Uses clap derive macros for argument parsing. Commands run against the
//! same orchestrator the HTTP server uses, in-process.

pub mod agent;
pub mod process;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use agentry_types::paging::{DEFAULT_PAGE_LIMIT, SortDirection};
use agentry_types::process::ExecutionMode;

/// Run stateful agent processes.
#[derive(Parser)]
#[command(name = "agentry", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "AGENTRY_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `[server] port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `[server] host`).
        #[arg(long)]
        host: Option<String>,

        /// Export spans to stdout through OpenTelemetry.
        #[arg(long)]
        otel: bool,
    },

    /// List registered agents.
    Agents,

    /// List an agent's actions and the states they run from.
    Actions {
        /// Agent name.
        agent: String,
    },

    /// Run an action, starting a process or resuming one.
    Dispatch {
        /// Agent name.
        agent: String,

        /// Action name.
        action: String,

        /// Process to resume; omit for initializer actions.
        #[arg(long)]
        process_id: Option<String>,

        /// Action input as a JSON object.
        #[arg(long)]
        input: Option<String>,

        /// Execution mode: sync, async or background.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ExecutionMode>,
    },

    /// Show the current snapshot of a process.
    Status {
        /// Agent name.
        agent: String,

        /// Process id.
        process_id: String,
    },

    /// List an agent's processes.
    #[command(alias = "ls")]
    List {
        /// Agent name.
        agent: String,

        /// Page size.
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u64,

        /// Number of processes to skip.
        #[arg(long, default_value_t = 0)]
        skip: u64,

        /// Order by last update: ascending or descending.
        #[arg(long, default_value = "ascending", value_parser = parse_sort)]
        sort: SortDirection,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn parse_mode(raw: &str) -> Result<ExecutionMode, String> {
    raw.parse()
}

fn parse_sort(raw: &str) -> Result<SortDirection, String> {
    raw.parse()
}
