//! dailybuild - scheduled multi-project build server
//!
//! One invocation is one run: check every project for upstream changes,
//! rebuild what changed, package the application when nothing failed, then
//! upload the artifact and post a single summary message.
//!
//! ## Usage
//!
//! ```text
//! dailybuild [SLACK_TOKEN] [S3_ACCESS_KEY] [S3_SECRET_KEY] [--profile FILE]
//! ```
//!
//! Missing credentials disable the matching feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dailybuild_ci::{Orchestrator, RunContext, RunReport};
use dailybuild_core::{init_tracing, PlatformProfile, SystemShell};
use dailybuild_publish::{S3Config, S3Uploader, SlackConfig, SlackNotifier};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "dailybuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rebuild, package, upload and report the OpenShot stack", long_about = None)]
struct Cli {
    /// Slack bot token used to post the run summary
    #[arg(env = "DAILYBUILD_SLACK_TOKEN", hide_env_values = true)]
    slack_token: Option<String>,

    /// Access key for artifact storage
    #[arg(env = "DAILYBUILD_S3_ACCESS_KEY", hide_env_values = true)]
    s3_access_key: Option<String>,

    /// Secret key for artifact storage
    #[arg(env = "DAILYBUILD_S3_SECRET_KEY", hide_env_values = true)]
    s3_secret_key: Option<String>,

    /// Profile overriding the built-in host defaults (TOML)
    #[arg(short, long, env = "DAILYBUILD_PROFILE")]
    profile: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long)]
    json: bool,

    /// Print the resolved profile as TOML and exit
    #[arg(long)]
    print_profile: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let profile = resolve_profile(cli.profile.as_deref())?;
    if cli.print_profile {
        print!("{}", profile.to_toml_string()?);
        return Ok(());
    }

    let ctx = build_context(profile, &cli)?;
    let report = Orchestrator::run(ctx).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }
    Ok(())
}

fn resolve_profile(path: Option<&Path>) -> Result<PlatformProfile> {
    match path {
        Some(path) => {
            let profile = PlatformProfile::load(path)
                .with_context(|| format!("Failed to load profile {}", path.display()))?;
            info!(profile = %path.display(), platform = %profile.platform, "loaded profile");
            Ok(profile)
        }
        None => Ok(PlatformProfile::for_host()),
    }
}

/// Assemble the run context, wiring outbound clients only when their
/// credentials are present.
fn build_context(profile: PlatformProfile, cli: &Cli) -> Result<RunContext> {
    let shell = Arc::new(SystemShell::new(profile.shell.clone()));

    let notifier = SlackConfig::from_token(cli.slack_token.clone(), &profile.notify)
        .map(SlackNotifier::new)
        .transpose()
        .context("Failed to set up Slack notifier")?;
    let uploader = S3Config::from_keys(
        cli.s3_access_key.clone(),
        cli.s3_secret_key.clone(),
        &profile.upload,
    )
    .map(S3Uploader::new)
    .transpose()
    .context("Failed to set up S3 uploader")?;

    if notifier.is_none() {
        info!("no Slack token, notifications will only be logged");
    }
    if uploader.is_none() {
        info!("no storage credentials, artifacts will not be uploaded");
    }

    let mut ctx = RunContext::new(profile, shell);
    if let Some(notifier) = notifier {
        ctx = ctx.with_notifier(Arc::new(notifier));
    }
    if let Some(uploader) = uploader {
        ctx = ctx.with_uploader(Arc::new(uploader));
    }
    Ok(ctx)
}

fn render_report(report: &RunReport) -> String {
    let mut out = format!(
        "Run {} finished in {} ms (plan {})\n",
        report.run_id,
        report.duration_ms,
        &report.plan_digest[..report.plan_digest.len().min(12)]
    );
    for visit in &report.projects {
        out.push_str(&format!(
            "  {:<20} {:?} ({} build steps)\n",
            visit.name,
            visit.state,
            visit.stages.len()
        ));
    }
    if let Some(artifact) = &report.artifact {
        out.push_str(&format!("Artifact:  {}\n", artifact.path.display()));
    }
    for warning in &report.warnings {
        out.push_str(&format!("Warning:   {warning}\n"));
    }
    out.push_str(&report.message);
    out
}
