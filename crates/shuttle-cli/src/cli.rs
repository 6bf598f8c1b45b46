//! Command line definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use shuttle_core::domain::PostingState;

#[derive(Parser, Debug)]
#[command(name = "shuttle")]
#[command(version)]
#[command(about = "Discovery-to-submission pipeline for job postings")]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML config file (built-in defaults when omitted)
    #[arg(long, short = 'c', env = "SHUTTLE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `state_dir` of the config
    #[arg(long, env = "SHUTTLE_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher, workers and inbox discovery until Ctrl-C
    Run,

    /// Run a single dispatcher tick and wait for the launched worker
    Tick,

    /// Insert one candidate given as JSON
    Submit {
        /// e.g. '{"url":"https://jobs.lever.co/acme/1","company":"Acme","title":"SRE"}'
        candidate: String,
    },

    /// Queue counts, lock holders and the top of each partition
    Status {
        /// Entries shown per partition
        #[arg(long, default_value = "5")]
        top: usize,

        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Partition lock overrides
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },

    /// Posting overrides
    Posting {
        #[command(subcommand)]
        command: PostingCommands,
    },

    /// Rewrite the journals from the current state
    Compact,

    /// Remove PENDING postings whose links are confirmed dead
    Sweep {
        /// Postings checked, oldest first
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum LockCommands {
    /// Expire a lock regardless of its holder
    Expire {
        /// Lock name (`apply-<partition>` or `dispatch`)
        name: String,

        #[command(flatten)]
        who: Operator,
    },
}

#[derive(Subcommand, Debug)]
pub enum PostingCommands {
    /// Force a posting into a state
    Force {
        /// Posting id (canonical URL key)
        id: String,

        state: StateArg,

        #[command(flatten)]
        who: Operator,

        /// Confirmation summary; required for `applied`
        #[arg(long)]
        evidence: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct Operator {
    #[arg(long)]
    pub operator: String,

    #[arg(long)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// States an operator may force. CLAIMED belongs to worker runs only.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateArg {
    Pending,
    Applied,
    Skipped,
    Deferred,
}

impl From<StateArg> for PostingState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Pending => PostingState::Pending,
            StateArg::Applied => PostingState::Applied,
            StateArg::Skipped => PostingState::Skipped,
            StateArg::Deferred => PostingState::Deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_force_with_operator() {
        let cli = Cli::try_parse_from([
            "shuttle",
            "--state-dir",
            "/tmp/s",
            "posting",
            "force",
            "jobs.lever.co/acme/1",
            "applied",
            "--operator",
            "kim",
            "--reason",
            "confirmed by email",
            "--evidence",
            "receipt 42",
        ])
        .unwrap();
        assert_eq!(cli.state_dir.as_deref(), Some(std::path::Path::new("/tmp/s")));
        match cli.command {
            Commands::Posting {
                command: PostingCommands::Force { state, who, evidence, .. },
            } => {
                assert_eq!(PostingState::from(state), PostingState::Applied);
                assert_eq!(who.operator, "kim");
                assert_eq!(evidence.as_deref(), Some("receipt 42"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn claimed_cannot_be_forced() {
        let err = Cli::try_parse_from([
            "shuttle", "posting", "force", "x", "claimed", "--operator", "a", "--reason", "b",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn lock_expire_requires_reason() {
        let err = Cli::try_parse_from(["shuttle", "lock", "expire", "apply-lever", "--operator", "a"]);
        assert!(err.is_err());
    }
}
