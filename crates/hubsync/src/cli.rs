//! Clap derive structures for the `hubsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hubsync -- mirror smart-home hub devices into an object tree
#[derive(Debug, Parser)]
#[command(
    name = "hubsync",
    version,
    about = "Synchronize smart-home hub devices into a path-addressed object tree",
    long_about = "Derives tree paths from hub devices, replays recorded hub sessions\n\
        through the synchronization engine and inspects the resulting tree.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HUBSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUBSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Derive the tree path for a device, channel or state
    #[command(alias = "p")]
    Path(PathArgs),

    /// Replay a recorded hub session into a tree file
    #[command(alias = "s")]
    Sync(SyncArgs),

    /// List room enumerations of a tree file
    #[command(alias = "r")]
    Rooms(RoomsArgs),

    /// Show CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── path ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PathArgs {
    /// Device display name
    pub device: String,

    /// Room (location) name; devices without one land in "Virtual"
    #[arg(long, short = 'r')]
    pub room: Option<String>,

    /// Capability config name (channel segment)
    #[arg(long, short = 'c')]
    pub channel: Option<String>,

    /// State name
    #[arg(long, short = 's')]
    pub state: Option<String>,

    /// Prefix the configured namespace (full store id)
    #[arg(long)]
    pub id: bool,
}

// ── sync ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Recorded hub session (JSON: devices plus scripted events)
    pub snapshot: PathBuf,

    /// Tree file to extend; written back after the run
    #[arg(long, short = 't')]
    pub tree: Option<PathBuf>,

    /// Seconds to wait for the first full synchronization pass
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Only list nodes of this kind
    #[arg(long, short = 'k')]
    pub kind: Option<NodeKindFilter>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NodeKindFilter {
    Device,
    Channel,
    State,
    Enum,
}

// ── rooms ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RoomsArgs {
    /// Tree file written by `hubsync sync`
    pub tree: PathBuf,
}

// ── config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

// ── completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
