use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pr_reviewer::ReviewEvent;

#[derive(Parser, Debug)]
#[command(
    name = "pr-review",
    about = "Diff-position aware pull request review submission"
)]
pub struct Cli {
    /// Repository as owner/repo. Defaults to $GITHUB_REPOSITORY.
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Debug logging for the reviewer library.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every diff line of a file with its position.
    Positions {
        pr: u64,
        path: String,
    },
    /// Check that a position is commentable in a file.
    Validate {
        pr: u64,
        path: String,
        #[arg(allow_negative_numbers = true)]
        position: i64,
    },
    /// Validate comments/findings and publish them as one review.
    Submit(SubmitArgs),
    /// Submit a pending review.
    Finalize {
        pr: u64,
        review_id: u64,
        #[arg(long, value_parser = parse_event)]
        event: ReviewEvent,
        #[arg(long)]
        body: String,
    },
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub pr: u64,

    /// JSON array of {path, position, body}.
    #[arg(long)]
    pub comments: Option<PathBuf>,

    /// JSON array of {severity, source?, path, position, body}; one file per analysis pass.
    #[arg(long)]
    pub findings: Vec<PathBuf>,

    /// Submit in the same call with this event (approve, request-changes, comment).
    #[arg(long, value_parser = parse_event)]
    pub event: Option<ReviewEvent>,

    /// Review summary body.
    #[arg(long)]
    pub body: Option<String>,

    /// Log the payload instead of calling the API.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_event(s: &str) -> Result<ReviewEvent, String> {
    s.parse()
}
