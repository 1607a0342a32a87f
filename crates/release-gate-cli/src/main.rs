//! Release Gate CLI
//!
//! The `release-gate` command checks that a release tag agrees with the
//! version a package manifest declares, and drives the tag-triggered release
//! pipeline.
//!
//! ## Commands
//!
//! - `check`: Compare a tag with the manifest's declared version
//! - `plan`: Show the resolved stage plan and its digest
//! - `run`: Execute the release pipeline for a tag

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use release_gate_core::{
    check_version, init_logging, install_panic_hook, resolve_trigger_tag, CommandVars, GateError,
    LogConfig, Manifest, ReleaseConfig, ReleasePipeline, ReleaseStage, RunReport, TagName,
    CONFIG_ENV, DEFAULT_CONFIG_FILE, EXIT_SUCCESS, EXIT_USAGE,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

const ROOT_NAME: &str = "release-gate";

#[derive(Parser)]
#[command(name = "release-gate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tag-triggered release gate for library packages", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a tag matches the manifest's declared version
    Check {
        /// Release tag (default: GITHUB_REF_NAME, then GITHUB_REF)
        #[arg(short, long)]
        tag: Option<String>,

        /// Packaging manifest to read
        #[arg(short, long, default_value = "pyproject.toml")]
        manifest: PathBuf,

        /// Release prefix stripped from the tag
        #[arg(long, default_value = "v")]
        prefix: String,
    },

    /// Show the resolved stage plan
    Plan {
        /// Release tag used to render commands
        #[arg(short, long)]
        tag: Option<String>,

        /// Configuration file (default: <workspace>/release-gate.toml)
        #[arg(short, long, env = CONFIG_ENV)]
        config: Option<PathBuf>,

        /// Package workspace
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },

    /// Run the release pipeline
    Run {
        /// Release tag (default: GITHUB_REF_NAME, then GITHUB_REF)
        #[arg(short, long)]
        tag: Option<String>,

        /// Configuration file (default: <workspace>/release-gate.toml)
        #[arg(short, long, env = CONFIG_ENV)]
        config: Option<PathBuf>,

        /// Package workspace
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(&cli);
    install_panic_hook(ROOT_NAME);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn setup_logging(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let mut config = LogConfig::new(ROOT_NAME)
        .with_console_level(level)
        .with_json(cli.json);
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_dir(dir);
    }

    match init_logging(&config) {
        Ok(handle) => {
            if let Some(file) = handle.log_file {
                info!(file = %file.display(), "Logging to file");
            }
        }
        Err(e) => {
            release_gate_core::telemetry::init_tracing(cli.json, level);
            warn!(error = %e, "Cannot open log file, logging to console only");
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Check {
            tag,
            manifest,
            prefix,
        } => cmd_check(tag.as_deref(), &manifest, &prefix),
        Commands::Plan {
            tag,
            config,
            workspace,
        } => cmd_plan(tag.as_deref(), config.as_deref(), &workspace),
        Commands::Run {
            tag,
            config,
            workspace,
            report,
        } => cmd_run(tag.as_deref(), config.as_deref(), &workspace, report.as_deref()).await,
    }
}

/// Exit code for an error, taken from the underlying [`GateError`] when
/// there is one.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<GateError>()
        .map(GateError::exit_code)
        .unwrap_or(EXIT_USAGE)
}

fn trigger_tag(explicit: Option<&str>) -> Result<String> {
    resolve_trigger_tag(explicit)
        .ok_or(GateError::EmptyTag)
        .context("No release tag: pass --tag or set GITHUB_REF_NAME")
}

fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<ReleaseConfig> {
    let config = match explicit {
        Some(path) => ReleaseConfig::load(path, true),
        None => ReleaseConfig::load(&workspace.join(DEFAULT_CONFIG_FILE), false),
    };
    config.context("Failed to load release configuration")
}

fn cmd_check(tag: Option<&str>, manifest_path: &Path, prefix: &str) -> Result<u8> {
    let raw = trigger_tag(tag)?;
    let tag = TagName::parse(&raw, prefix)?;
    let manifest = Manifest::load(manifest_path)?;
    let matched = check_version(&tag, &manifest)?;

    println!(
        "✓ Tag {} matches {} version {}",
        tag,
        manifest_path.display(),
        matched.version()
    );
    Ok(EXIT_SUCCESS)
}

fn cmd_plan(tag: Option<&str>, config_path: Option<&Path>, workspace: &Path) -> Result<u8> {
    let config = load_config(config_path, workspace)?;
    let plan = config.stage_plan(workspace);
    let digest = release_gate_core::plan_digest(&plan);

    let vars = match resolve_trigger_tag(tag) {
        Some(raw) => {
            let tag = TagName::parse(&raw, &config.tag_prefix)?;
            CommandVars {
                tag: tag.short_name().to_string(),
                version: tag.version,
                python: config.python.clone(),
                artifacts: vec![config.artifacts.dir.join(&config.artifacts.pattern)],
            }
        }
        None => CommandVars {
            tag: "{tag}".to_string(),
            version: "{version}".to_string(),
            python: config.python.clone(),
            artifacts: vec![PathBuf::from("{artifacts}")],
        },
    };

    println!("Release plan for workspace: {}", workspace.display());
    println!("Manifest: {}", config.manifest.display());
    println!("Credential: ${}", config.credential_env);
    println!();
    for stage in &plan {
        let command = if stage.stage == ReleaseStage::VerifyVersion {
            "(in-process version check)".to_string()
        } else {
            stage.render(&vars).join(" ")
        };
        let status = if stage.enabled { "+" } else { "-" };
        println!("  {} {:<15} {}", status, stage.stage.name(), command);
    }
    println!();
    println!("Plan digest: {}", digest);
    Ok(EXIT_SUCCESS)
}

async fn cmd_run(
    tag: Option<&str>,
    config_path: Option<&Path>,
    workspace: &Path,
    report_path: Option<&Path>,
) -> Result<u8> {
    let config = load_config(config_path, workspace)?;
    let raw = trigger_tag(tag)?;

    println!("Running release for workspace: {}", workspace.display());
    println!("Tag: {}", raw);
    println!();

    let pipeline = ReleasePipeline::with_process_tools(config, workspace);
    let report = pipeline.run_tag(&raw).await?;

    print_report(&report);

    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote run report");
    }

    Ok(report.exit_code())
}

fn print_report(report: &RunReport) {
    println!("Run ID: {}", report.run_id);
    println!(
        "Status: {}",
        if report.success() { "✓ PUBLISHED" } else { "✗ FAILED" }
    );
    println!("State: {}", report.final_state);
    println!("Duration: {}ms", report.duration_ms);
    println!();

    for stage in &report.stages {
        let status = if stage.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage.stage, stage.duration_ms, stage.exit_code
        );
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        report.passed_count(),
        report.stages.len()
    );

    println!(
        "Gate: {}",
        if report.verdict.passed { "✓ PASSED" } else { "✗ FAILED" }
    );
    if !report.verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &report.verdict.violations {
            println!("  - {}", violation);
        }
    }

    if report.success() {
        println!("\n✓ Released {}", report.version.as_deref().unwrap_or("?"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "release-gate",
            "--verbose",
            "run",
            "--tag",
            "v1.0.0",
            "--workspace",
            "/tmp/pkg",
            "--report",
            "out.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                tag,
                workspace,
                report,
                ..
            } => {
                assert_eq!(tag.as_deref(), Some("v1.0.0"));
                assert_eq!(workspace, PathBuf::from("/tmp/pkg"));
                assert_eq!(report, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_check_defaults() {
        let cli = Cli::try_parse_from(["release-gate", "check", "-t", "v2.0.0"]).unwrap();
        match cli.command {
            Commands::Check {
                manifest, prefix, ..
            } => {
                assert_eq!(manifest, PathBuf::from("pyproject.toml"));
                assert_eq!(prefix, "v");
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_exit_code_follows_gate_error() {
        let mismatch = anyhow::Error::new(GateError::VersionMismatch {
            tag_version: "1.0.0".into(),
            declared: Some("1.0.1".into()),
        });
        assert_eq!(exit_code_for(&mismatch), 2);

        let wrapped = anyhow::Error::new(GateError::EmptyTag).context("no tag");
        assert_eq!(exit_code_for(&wrapped), EXIT_USAGE);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), EXIT_USAGE);
    }
}
