//! Command-line argument parsing for composable-rag
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// composable-rag - Graph RAG pipelines with graceful degradation
#[derive(Parser, Debug)]
#[command(name = "composable-rag")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(
    about = "Answer questions over a property graph with degradation-aware RAG pipelines",
    long_about = None
)]
pub struct Args {
    /// Configuration file path (defaults to ~/.composable-rag/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured Ollama model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only print the answer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a question, run it through the scheduler and print the answer
    Ask {
        /// The question to answer
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Seconds to wait for the task before giving up
        #[arg(long, default_value_t = 120)]
        wait: u64,

        /// Skip the model-backed intent classifier and use keyword rules
        #[arg(long)]
        keyword_intent: bool,

        /// Custom answer prompt with {question} and {context} placeholders
        #[arg(long)]
        answer_prompt: Option<String>,

        /// Print the full task result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in operations, their fallbacks and degradation thresholds
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display the effective configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        init: bool,
    },
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
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "composable_rag=info,warn",
            Verbosity::VeryVerbose => "composable_rag=debug,info",
        }
    }

    /// Check if should show the execution report
    pub fn show_report(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
