mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pr_reviewer::errors::{Error as ReviewerError, MrResult, ParseError};
use pr_reviewer::git_providers::{ChangeRequestId, GitHubClient};
use pr_reviewer::review::fanout;
use pr_reviewer::review::policy::{self, Finding};
use pr_reviewer::{CommentInput, ReviewPublisher, ReviewSession, ReviewerConfig, telemetry};

use cli::{Cli, Commands, SubmitArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("warn", level))
        .with(telemetry::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(e: &anyhow::Error) {
    eprintln!("{} {e:#}", "error:".red().bold());
    if let Some(p) = e
        .downcast_ref::<ReviewerError>()
        .and_then(ReviewerError::protocol)
    {
        eprintln!("{} {}", "hint:".yellow().bold(), p.hint());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = ReviewerConfig::from_env()?;
    let repo = cli
        .repo
        .clone()
        .or_else(|| cfg.repository.clone())
        .context("no repository given (use --repo owner/repo or set GITHUB_REPOSITORY)")?;
    let client = GitHubClient::from_config(cfg.provider_config()?)?;

    match cli.command {
        Commands::Positions { pr, path } => {
            let session = session(&client, &repo, pr, &cfg).await?;
            let file = session.index.get(&path).ok_or_else(|| {
                ReviewerError::from(ParseError::FileNotInDiff {
                    path: path.clone(),
                    available: session.index.paths().map(str::to_string).collect(),
                })
            })?;
            print!("{}", file.render_positions());
        }
        Commands::Validate { pr, path, position } => {
            let session = session(&client, &repo, pr, &cfg).await?;
            let line = session.index.validate(&path, position)?;
            println!(
                "{} {path}:{position} -> {}{}",
                "ok".green(),
                line.kind.marker(),
                line.text
            );
        }
        Commands::Submit(args) => submit(&client, &repo, &cfg, args).await?,
        Commands::Finalize {
            pr,
            review_id,
            event,
            body,
        } => {
            let id = ChangeRequestId::new(&repo, pr)?;
            let publisher = ReviewPublisher::new(client, id, cfg.publish);
            let submitted = publisher.submit_by_id(review_id, event, &body).await?;
            println!(
                "{} review {} submitted ({event}) {}",
                "ok".green(),
                submitted.id,
                submitted.html_url.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn session(
    client: &GitHubClient,
    repo: &str,
    pr: u64,
    cfg: &ReviewerConfig,
) -> Result<ReviewSession> {
    let id = ChangeRequestId::new(repo, pr)?;
    Ok(pr_reviewer::load_session(client, &id, cfg.cache_dir.as_deref()).await?)
}

async fn submit(
    client: &GitHubClient,
    repo: &str,
    cfg: &ReviewerConfig,
    args: SubmitArgs,
) -> Result<()> {
    if args.comments.is_none() && args.findings.is_empty() && args.event.is_none() {
        bail!("nothing to submit: pass --comments, --findings or --event");
    }
    let session = session(client, repo, args.pr, cfg).await?;

    let mut inputs: Vec<CommentInput> = match &args.comments {
        Some(path) => read_json(path)
            .await
            .with_context(|| format!("reading comments from {}", path.display()))?,
        None => Vec::new(),
    };

    let mut body = args.body.clone();
    if !args.findings.is_empty() {
        let passes = args
            .findings
            .iter()
            .map(|p| (pass_name(p), load_findings(p.clone())))
            .collect();
        let report = fanout::run_analyses(passes, cfg.analysis_timeout).await;
        for (name, reason) in &report.failed {
            eprintln!("{} pass `{name}` skipped: {reason}", "warning:".yellow());
        }
        let merged = report.merged();
        inputs.extend(policy::comment_inputs(&merged));
        if body.is_none() {
            body = Some(policy::render_summary(&merged, &report.missing()));
        }
    }

    let mut builder = session.draft().comments(inputs);
    if let Some(event) = args.event {
        builder = builder.event(event);
    }
    if let Some(body) = body {
        builder = builder.summary(body);
    }
    let draft = builder.build(&session.index).map_err(ReviewerError::from)?;

    let mut publish_cfg = cfg.publish;
    publish_cfg.dry_run |= args.dry_run;
    let publisher = ReviewPublisher::new(client.clone(), session.bundle.meta.id.clone(), publish_cfg);
    let outcome = publisher.publish(&draft, None).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    let failed = outcome.comments.iter().filter(|c| !c.is_posted()).count();
    if failed > 0 {
        bail!("{failed} comment(s) could not be posted individually");
    }
    Ok(())
}

fn pass_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn load_findings(path: PathBuf) -> MrResult<Vec<Finding>> {
    let data = tokio::fs::read(&path).await?;
    Ok(serde_json::from_slice(&data)?)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}
