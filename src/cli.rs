// ABOUTME: clap-derive argument shapes for the dump/load subcommands
// ABOUTME: CLI flags are merged over an optional TOML config file, CLI always wins

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "snapdump")]
#[command(about = "Referentially-closed partial snapshots for PostgreSQL and SQLite", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a referentially-closed snapshot to an archive
    Dump {
        #[command(flatten)]
        conn: ConnArgs,
        /// Path to the output archive
        #[arg(short = 'o', long)]
        output: String,
        /// Export this table in full (repeatable)
        #[arg(short = 'f', long = "full")]
        full_tables: Vec<String>,
        /// Export a partial table as `table:SQL` (repeatable)
        #[arg(short = 'p', long = "partial")]
        partial_tables: Vec<String>,
        /// Archive compression method
        #[arg(short = 'c', long, default_value = "deflated")]
        compression: String,
        #[arg(long = "schema", action = clap::ArgAction::SetTrue)]
        schema: bool,
        #[arg(long = "no-schema", action = clap::ArgAction::SetTrue)]
        no_schema: bool,
        #[arg(long = "data", action = clap::ArgAction::SetTrue)]
        data: bool,
        #[arg(long = "no-data", action = clap::ArgAction::SetTrue)]
        no_data: bool,
        /// Path to a TOML config file merged under these flags
        #[arg(long)]
        config: Option<String>,
        /// Increase log verbosity (repeatable, 0-2)
        #[arg(short = 'v', action = clap::ArgAction::Count)]
        verbose: u8,
    },
    /// Replay an archive onto a database
    Load {
        #[command(flatten)]
        conn: ConnArgs,
        /// Path to the input archive
        #[arg(short = 'i', long)]
        input: String,
        /// Cleanup mode applied to the target before loading; absent means skip
        #[arg(short = 'm', long)]
        cleanup: Option<String>,
        #[arg(long)]
        config: Option<String>,
        #[arg(short = 'v', action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

/// Connection flags shared by both subcommands. `--sqlite` and the
/// PostgreSQL flags are mutually exclusive — selecting both is an
/// `InvalidRequest`, checked after parsing since clap's own exclusivity
/// groups can't span the `-D`/`-U`/`-H`/`-P`/`-W` quintet cleanly.
#[derive(Args, Clone, Default)]
pub struct ConnArgs {
    /// PostgreSQL database name
    #[arg(short = 'D', long)]
    pub dbname: Option<String>,
    #[arg(short = 'U', long)]
    pub user: Option<String>,
    #[arg(short = 'W', long)]
    pub password: Option<String>,
    #[arg(short = 'H', long, default_value = "localhost")]
    pub host: String,
    #[arg(short = 'P', long, default_value_t = 5432)]
    pub port: u16,
    /// SQLite database file, selects the SQLite engine
    #[arg(long)]
    pub sqlite: Option<String>,
}
