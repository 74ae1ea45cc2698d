use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(version)]
#[command(about = "Transactional configuration manager for fleets of network devices", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Main configuration file to load
    #[arg(short, long, global = true, env = "CONVOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of devices to work on in parallel
    #[arg(short, long, global = true, default_value_t = 4)]
    pub jobs: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Diff candidate configurations against the running ones
    Diff(DiffArgs),

    /// Apply candidate configurations through the confirmed-commit protocol
    Commit(CommitArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Devices to target: role:<name>, site:<name>, or an FQDN glob
    pub query: String,

    /// Report whether diffs exist without printing their content
    #[arg(short, long)]
    pub omit_diff: bool,
}

#[derive(Parser)]
pub struct CommitArgs {
    /// Devices to target: role:<name>, site:<name>, or an FQDN glob
    pub query: String,

    /// Commit message recorded on the devices
    #[arg(short, long)]
    pub message: String,

    /// Approve every change without prompting (enables parallel commits)
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_commit_requires_message() {
        let result = Cli::try_parse_from(["convoy", "commit", "leaf*"]);
        assert!(result.is_err());
        let cli = Cli::try_parse_from(["convoy", "commit", "leaf*", "-m", "maintenance"]).unwrap();
        match cli.command {
            Command::Commit(args) => {
                assert_eq!(args.query, "leaf*");
                assert_eq!(args.message, "maintenance");
                assert!(!args.yes);
            }
            _ => panic!("expected commit subcommand"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["convoy", "-vv", "-j", "8", "diff", "*"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.jobs, 8);
    }
}
