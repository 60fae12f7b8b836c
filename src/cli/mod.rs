//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// enn - camera discovery, settings and conditional automation backed by a
/// shared settings store.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "enn", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags naturally use multiple bools
pub struct Cli {
    /// Settings store host (must be given together with --db-port)
    #[arg(long, global = true, env = "ENN_DB_HOST", requires = "db_port")]
    pub db_host: Option<String>,

    /// Settings store port (must be given together with --db-host)
    #[arg(long, global = true, env = "ENN_DB_PORT", requires = "db_host")]
    pub db_port: Option<u16>,

    /// Key the downstream pipeline reads from
    #[arg(long, global = true)]
    pub db_key: Option<String>,

    /// Field of --db-key the downstream pipeline reads from
    #[arg(long, global = true)]
    pub db_key_field: Option<String>,

    /// Configuration file (default: <config dir>/enn/config.toml)
    #[arg(long, short = 'c', global = true, env = "ENN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "ENN_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Devices ===
    /// Discover attached devices and update the session
    Discover,

    /// List known devices from the session
    Devices(DevicesArgs),

    /// Watch for hotplug and store changes until interrupted
    Watch(WatchArgs),

    /// Apply one setting to a device
    Set(SetArgs),

    /// Capture from a device into the store
    Slurp(SlurpArgs),

    // === Store data ===
    /// Manage conditional rules
    #[command(subcommand)]
    Conditional(ConditionalCommand),

    /// Inspect the session snapshot
    #[command(subcommand)]
    Session(SessionCommand),

    /// Manage shared environment values
    #[command(subcommand)]
    Env(EnvCommand),

    /// Load or query the script reference
    #[command(subcommand)]
    Reference(ReferenceCommand),

    // === Utilities ===
    /// Show connection and configuration status
    Status,

    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct DevicesArgs {
    /// Run discovery before listing
    #[arg(long, short = 'd')]
    pub discover: bool,

    /// Include adjustable settings from the script reference
    #[arg(long, short = 'l')]
    pub long: bool,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Exit after the first tick that handled events
    #[arg(long)]
    pub once: bool,

    /// Timeout in seconds (0 = no timeout)
    #[arg(long, short = 't', default_value = "0")]
    pub timeout: u64,

    /// Do not subscribe to store keyspace notifications
    #[arg(long)]
    pub no_keyspace: bool,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Device uid
    pub uid: String,

    /// Setting name
    pub name: String,

    /// Setting value
    pub value: String,
}

#[derive(Parser, Debug)]
pub struct SlurpArgs {
    /// Device uid
    pub uid: String,

    /// Metadata to store with the capture (field=value, repeatable)
    #[arg(long, short = 'm', value_name = "FIELD=VALUE")]
    pub meta: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConditionalCommand {
    /// Create or replace a rule
    ///
    /// # Examples
    ///
    /// ```bash
    /// enn conditional write cam-1 night --set iso=1600 --post notify.sh
    /// enn conditional write cam-1 night --merge --pre check_light.sh
    /// ```
    Write(ConditionalWriteArgs),

    /// Show one rule
    Show(ConditionalRef),

    /// List the rules of a device
    List(ConditionalListArgs),

    /// Delete a rule
    Remove(ConditionalRef),

    /// Apply the set step of a rule to a discovered device
    Apply(ConditionalRef),
}

#[derive(Parser, Debug)]
pub struct ConditionalRef {
    /// Device uid
    pub device: String,

    /// Rule name
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct ConditionalListArgs {
    /// Device uid
    pub device: String,
}

#[derive(Parser, Debug)]
pub struct ConditionalWriteArgs {
    /// Device uid
    pub device: String,

    /// Rule name
    pub name: String,

    /// Pre-condition script (repeatable, in order)
    #[arg(long, value_name = "SCRIPT")]
    pub pre: Vec<String>,

    /// Setting to apply (repeatable)
    #[arg(long, value_name = "FIELD=VALUE")]
    pub set: Vec<String>,

    /// Post-action script (repeatable, in order)
    #[arg(long, value_name = "SCRIPT")]
    pub post: Vec<String>,

    /// Keep stored steps that are not given on the command line
    #[arg(long)]
    pub merge: bool,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Discover devices and write the session file
    Save,

    /// Print the session document
    Show,

    /// Print the session file path
    Path,
}

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Show all values
    Show,

    /// Create or update a value
    Set {
        field: String,
        value: String,
    },

    /// Remove a value
    Remove {
        field: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReferenceCommand {
    /// Load reference documents (the bundled one when none are given)
    Load {
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Show the adjustable settings of a device model
    Lookup {
        /// Device model name as reported by discovery
        name: String,
    },
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
