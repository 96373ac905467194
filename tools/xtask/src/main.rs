//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use warden_audit::AuditConfig;
use warden_audit::registry::REGISTRY;
use warden_audit::report::ReportScope;
use warden_core::{LogFormat, init_logging};

const REQUIRED_CRATE_ATTRS: [&str; 2] = ["#![forbid(unsafe_code)]", "#![deny(missing_docs)]"];

#[derive(Parser)]
#[command(name = "xtask", about = "Warden workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and docs
    Ci,
    /// Validate crate naming and crate-level lint attributes
    Lint,
    /// Print the configuration resolved from WARDEN_* variables and the watch table
    Config,
}

fn main() -> Result<()> {
    init_logging(LogFormat::from_env());
    match Cli::parse().command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(),
        Commands::Config => show_config(),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_cmd("cargo", &["fmt", "--check"])?;
    run_cmd("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    run_cmd("cargo", &["test", "--workspace"])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"])?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint() -> Result<()> {
    println!("Validating workspace conventions...\n");

    for entry in std::fs::read_dir("crates").context("reading crates/")? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("warden-") {
            anyhow::bail!("crate '{name}' does not follow warden-* naming");
        }
        check_crate_attrs(&entry.path().join("src/lib.rs"), &name)?;
    }

    println!("All conventions validated!");
    Ok(())
}

fn check_crate_attrs(lib: &Path, name: &str) -> Result<()> {
    let source =
        std::fs::read_to_string(lib).with_context(|| format!("reading {}", lib.display()))?;
    for attr in REQUIRED_CRATE_ATTRS {
        if !source.contains(attr) {
            anyhow::bail!("crate '{name}' is missing {attr}");
        }
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let config = AuditConfig::from_env().context("loading WARDEN_* configuration")?;
    let (mode, operator_namespace, targets) = config.resolve_install_mode()?;

    println!("operator namespace:   {operator_namespace}");
    println!("install mode:         {mode:?}");
    println!("target namespaces:    {targets:?}");
    println!("excluded namespaces:  {:?}", config.exclude_namespaces());
    println!(
        "policy config:        {}/{}",
        config.operator_namespace, config.policies_config_name
    );
    println!(
        "stale batch:          {} every {:?}",
        config.batch_delete_limit, config.batch_delete_delay
    );
    println!("rbac assessment:      {}", config.rbac_assessment_enabled);
    println!();

    for row in &REGISTRY {
        let scope = match row.scope {
            ReportScope::Namespaced => "namespaced",
            ReportScope::Cluster => "cluster",
        };
        println!("{:<26} {:<11} {}", row.kind.as_str(), scope, row.owns);
    }
    Ok(())
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}
