use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scloud_types::{GroupId, PageId, RevisionId, UserId};

#[derive(Parser)]
#[command(
    name = "scloud",
    about = "Sharing Cloud: versioned page storage for group file sharing",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./scloud.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `data_file` from the configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub data: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage pages
    #[command(subcommand)]
    Page(PageCommand),
    /// Manage revisions
    #[command(subcommand)]
    Revision(RevisionCommand),
    /// Recompute checksums of every blob a page owns
    Verify(VerifyArgs),
    /// Show pool and table statistics
    Status,
}

#[derive(Subcommand)]
pub enum PageCommand {
    /// Create a page with its first revision
    Create(PageCreateArgs),
    /// List the pages of a group
    List(PageListArgs),
    /// Show a page and its latest revision
    Show(PageRefArgs),
    /// Delete a page with all of its revisions and content
    Delete(PageRefArgs),
}

#[derive(Subcommand)]
pub enum RevisionCommand {
    /// Upload a new revision of a page
    Append(RevisionAppendArgs),
    /// Show the revision history of a page
    Log(PageRefArgs),
    /// Print the content of a revision
    Cat(RevisionCatArgs),
}

#[derive(Args)]
pub struct PageCreateArgs {
    #[arg(long)]
    pub group: GroupId,
    #[arg(long)]
    pub user: UserId,
    #[arg(long)]
    pub name: String,
    /// File whose bytes become the first revision
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,
    #[arg(short, long, default_value = "")]
    pub message: String,
}

#[derive(Args)]
pub struct PageListArgs {
    #[arg(long)]
    pub group: GroupId,
}

#[derive(Args)]
pub struct PageRefArgs {
    pub page: PageId,
}

#[derive(Args)]
pub struct RevisionAppendArgs {
    #[arg(long)]
    pub page: PageId,
    #[arg(long)]
    pub user: UserId,
    /// Parent revision; the page's latest revision when omitted
    #[arg(long)]
    pub parent: Option<RevisionId>,
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,
    #[arg(short, long)]
    pub message: String,
}

#[derive(Args)]
pub struct RevisionCatArgs {
    pub revision: RevisionId,
    /// Write the content here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub page: PageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labelled_ids() {
        let cli = Cli::try_parse_from([
            "scloud", "revision", "append", "--page", "page#3", "--user", "7", "--file",
            "a.txt", "-m", "edit",
        ])
        .unwrap();
        match cli.command {
            Command::Revision(RevisionCommand::Append(args)) => {
                assert_eq!(args.page, PageId::new(3));
                assert_eq!(args.user, UserId::new(7));
                assert_eq!(args.parent, None);
                assert_eq!(args.message, "edit");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["scloud", "status", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn rejects_malformed_id() {
        assert!(Cli::try_parse_from(["scloud", "page", "show", "page#x"]).is_err());
    }
}
