//! CLI for secret synchronization
//!
//! Run `secret-sync --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secret_sync::{
    evaluate, ConsumerRegistry, EnvAuthority, ExportRequest, ExportWorker, GhDispatcher,
    GhRegistry, KubeRegistry, RegistryKind, SecretName, SyncConfig, SyncReport, SyncRequester,
    TargetIdentity,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "secret-sync")]
#[command(about = "Sync named secrets from their authority into a consumer registry")]
#[command(version)]
struct Cli {
    /// Output format: json, text
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Backend {
    /// Repository Actions secrets via the gh CLI (target: owner/repo)
    Github,
    /// Kubernetes Secret objects (target: namespace/secret)
    Kube,
}

impl Backend {
    const fn kind(self) -> RegistryKind {
        match self {
            Self::Github => RegistryKind::Github,
            Self::Kube => RegistryKind::Kube,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure secrets exist in the target, exporting missing ones
    Ensure {
        /// Target registry identity (github:owner/repo or kube:namespace/secret)
        #[arg(short, long)]
        target: String,

        /// Secret names (space or comma separated)
        #[arg(required = true, value_delimiter = ',')]
        names: Vec<String>,

        /// Authority repository that exports are requested from
        #[arg(short, long)]
        authority: Option<String>,

        /// Maximum seconds to wait for each export
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Seconds between presence checks
        #[arg(long)]
        poll_interval_secs: Option<u64>,

        /// Report missing secrets but exit successfully
        #[arg(long)]
        allow_degraded: bool,

        /// Registry backend for a target without a scheme [default: github]
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },

    /// Copy one secret from this environment into the target (authority side)
    Export {
        /// Secret name
        #[arg(short, long)]
        name: String,

        /// Target registry identity (github:owner/repo or kube:namespace/secret)
        #[arg(short, long)]
        target: String,

        /// Prefix of the environment variable holding the value
        #[arg(long, default_value = "")]
        env_prefix: String,

        /// Registry backend for a target without a scheme [default: github]
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },

    /// Report which secrets exist in the target without exporting anything
    Check {
        /// Target registry identity (github:owner/repo or kube:namespace/secret)
        #[arg(short, long)]
        target: String,

        /// Secret names (space or comma separated)
        #[arg(required = true, value_delimiter = ',')]
        names: Vec<String>,

        /// Registry backend for a target without a scheme [default: github]
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Ensure {
            target,
            names,
            authority,
            timeout_secs,
            poll_interval_secs,
            allow_degraded,
            backend,
        } => {
            let mut config = SyncConfig::from_env()?;
            if let Some(authority) = authority {
                config = config.with_authority(authority);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = poll_interval_secs {
                config = config.with_poll_interval(Duration::from_secs(secs));
            }
            if allow_degraded {
                config = config.with_degraded(true);
            }
            run_ensure(&target, &names, config, backend, cli.format).await?;
        }
        Commands::Export {
            name,
            target,
            env_prefix,
            backend,
        } => {
            run_export(&name, &target, &env_prefix, backend).await?;
        }
        Commands::Check {
            target,
            names,
            backend,
        } => {
            run_check(&target, &names, backend, cli.format).await?;
        }
    }

    Ok(())
}

async fn registry_for(kind: RegistryKind) -> Result<Arc<dyn ConsumerRegistry>> {
    let registry: Arc<dyn ConsumerRegistry> = match kind {
        RegistryKind::Github => Arc::new(GhRegistry::new()),
        RegistryKind::Kube => Arc::new(
            KubeRegistry::try_default()
                .await
                .context("Failed to create Kubernetes client")?,
        ),
    };
    Ok(registry)
}

/// Parse a target and pin its registry kind, so the authority's export
/// writes to the same kind of registry the requester polls.
fn resolve_target(
    target: &str,
    backend: Option<Backend>,
) -> Result<(TargetIdentity, RegistryKind)> {
    let target = TargetIdentity::parse(target)?;
    let kind = backend.map_or_else(
        || target.kind().unwrap_or(RegistryKind::Github),
        Backend::kind,
    );
    let target = target
        .qualified(kind)
        .context("The --backend flag contradicts the target's scheme")?;
    Ok((target, kind))
}

fn parse_names(names: &[String]) -> Result<Vec<SecretName>> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| SecretName::parse(name).with_context(|| format!("Invalid secret name '{name}'")))
        .collect()
}

async fn run_ensure(
    target: &str,
    names: &[String],
    config: SyncConfig,
    backend: Option<Backend>,
    format: OutputFormat,
) -> Result<()> {
    let (target, kind) = resolve_target(target, backend)?;
    let names = parse_names(names)?;
    let allow_degraded = config.allow_degraded;

    let dispatcher = GhDispatcher::new(config.authority.clone(), config.dispatch_event.clone());
    let requester = SyncRequester::new(registry_for(kind).await?, Arc::new(dispatcher), config)?;

    let report = requester.ensure(names, &target).await;
    print_report(&target, &report, format)?;

    evaluate(&report, allow_degraded).context(
        "Verify the authority holds these secrets and that the export dispatch is reachable",
    )?;
    Ok(())
}

async fn run_export(
    name: &str,
    target: &str,
    env_prefix: &str,
    backend: Option<Backend>,
) -> Result<()> {
    let (target, kind) = resolve_target(target, backend)?;
    let request = ExportRequest {
        secret_name: name.to_string(),
        target: target.to_string(),
    };
    let worker = ExportWorker::new(
        Arc::new(EnvAuthority::with_prefix(env_prefix)),
        registry_for(kind).await?,
    );

    worker.run(&request).await?;

    println!("✅ Exported {name} to {target}");
    Ok(())
}

async fn run_check(
    target: &str,
    names: &[String],
    backend: Option<Backend>,
    format: OutputFormat,
) -> Result<()> {
    let (target, kind) = resolve_target(target, backend)?;
    let registry = registry_for(kind).await?;

    let mut missing = vec![];
    let mut results = serde_json::Map::new();
    for name in parse_names(names)? {
        let present = registry.has_secret(&target, &name).await?;
        if !present {
            missing.push(name.to_string());
        }
        results.insert(name.to_string(), serde_json::Value::Bool(present));
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            println!("Secrets in {target}:");
            for (name, present) in &results {
                let mark = if present.as_bool().unwrap_or(false) {
                    "present"
                } else {
                    "missing"
                };
                println!("  {name}: {mark}");
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing secrets in {target}: {}", missing.join(", "));
    }
    Ok(())
}

fn print_report(target: &TargetIdentity, report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("Secret sync for {target} ({} secret(s)):", report.len());
            for (name, outcome) in report.iter() {
                let mark = if outcome.is_success() { "✅" } else { "❌" };
                println!("  {mark} {name}: {outcome}");
            }
        }
    }
    Ok(())
}
