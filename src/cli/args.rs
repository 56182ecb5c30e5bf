//! Command-line argument parsing for Lexi
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lexi - multi-agent legal assistant for Victorian laws and court procedures
#[derive(Parser, Debug)]
#[command(name = "lexi")]
#[command(version)]
#[command(about = "Multi-agent legal assistant for Victorian laws and court procedures", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen host (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        #[arg(value_name = "QUESTION")]
        query: String,

        /// PDF or image to use as context
        #[arg(short, long)]
        attach: Option<PathBuf>,

        /// Conversation thread
        #[arg(long, default_value = "cli")]
        thread: String,
    },

    /// Interactive chat
    Chat {
        /// Log in as this user; their username becomes the thread
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Create a user account
    Register {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        /// Read from LEXI_PASSWORD when omitted, else prompted
        #[arg(long)]
        password: Option<String>,
    },

    /// Check a username and password
    Login {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Mirror remote vector indexes into local directories
    Sync {
        /// Re-sync even when a mirror already has files
        #[arg(long)]
        force: bool,

        /// Replace files that already exist locally
        #[arg(long)]
        overwrite: bool,
    },

    /// Run system diagnostics and health checks
    Doctor,

    /// Display current configuration (secrets masked)
    Config {
        /// Write the effective configuration to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Inspect or trim the query cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Show entry counts and memory use
    Stats,
    /// Evict entries close to expiry
    Evict,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["lexi", "-q", "doctor"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["lexi", "doctor"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["lexi", "doctor", "-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["lexi", "-vv", "doctor"]).verbosity(), Verbosity::VeryVerbose);
        assert!(!Verbosity::Quiet.show_progress());
    }

    #[test]
    fn test_ask() {
        let args = parse(&["lexi", "ask", "What is bail?", "--attach", "charge.pdf"]);
        match args.command {
            Commands::Ask { query, attach, thread } => {
                assert_eq!(query, "What is bail?");
                assert_eq!(attach, Some(PathBuf::from("charge.pdf")));
                assert_eq!(thread, "cli");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_serve_overrides() {
        let args = parse(&["lexi", "--config", "lexi.toml", "serve", "--port", "9000"]);
        assert_eq!(args.config, Some(PathBuf::from("lexi.toml")));
        assert!(matches!(args.command, Commands::Serve { host: None, port: Some(9000) }));
    }

    #[test]
    fn test_cache_subcommands() {
        assert!(matches!(
            parse(&["lexi", "cache", "stats"]).command,
            Commands::Cache { action: CacheCommand::Stats }
        ));
        assert!(matches!(
            parse(&["lexi", "cache", "evict"]).command,
            Commands::Cache { action: CacheCommand::Evict }
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["lexi"]).is_err());
        assert!(Args::try_parse_from(["lexi", "register", "--username", "a"]).is_err());
    }
}
