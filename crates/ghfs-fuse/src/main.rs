//! ghfs - Mount GitHub as a read-only FUSE filesystem.
//!
//! Usage: ghfs [OPTIONS] <MOUNTPOINT>
//!
//! The mount root lists the authenticated account and the accounts it
//! follows; below each account are its repositories, and below each
//! repository the default-branch tree.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ghfs_core::config::RemoteConfig;
use ghfs_core::remote::http::resolve_token;
use ghfs_core::remote::{GraphQlSource, HttpClient, RemoteSource, RestSource};
use ghfs_core::Resolver;
use ghfs_fuse::{GithubFS, MountConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Which API shape to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// REST endpoints, offset pagination.
    Rest,
    /// GraphQL queries, cursor pagination. Binary files are not readable.
    Graphql,
}

#[derive(Parser)]
#[command(name = "ghfs")]
#[command(about = "Mount GitHub accounts, repositories and trees as a read-only filesystem")]
#[command(version)]
struct Cli {
    /// Mountpoint for the filesystem (an existing directory)
    mountpoint: PathBuf,

    /// API backend
    #[arg(long, env = "GHFS_BACKEND", value_enum, default_value_t = Backend::Rest)]
    backend: Backend,

    /// Config file (default: the platform config directory's ghfs/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// REST API root, for GitHub Enterprise
    #[arg(long)]
    api_url: Option<String>,

    /// GraphQL endpoint, for GitHub Enterprise
    #[arg(long)]
    graphql_url: Option<String>,

    /// Access token (GITHUB_TOKEN is also read; falls back to `gh auth token`)
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds one filesystem operation may take before failing with ETIMEDOUT
    #[arg(long, value_name = "SECS")]
    io_timeout: Option<u64>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    run(cli).inspect_err(|e| error!("{e:#}"))
}

fn run(cli: Cli) -> Result<()> {
    if !cli.mountpoint.is_dir() {
        anyhow::bail!("Mountpoint is not a directory: {}", cli.mountpoint.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let config = load_config(&cli)?;
    let token = runtime
        .block_on(resolve_token(&config))
        .context("No GitHub credentials")?;
    let client = HttpClient::new(&config, &token).context("Failed to build HTTP client")?;

    let mut mount = MountConfig::default().allow_other(cli.allow_other);
    if let Some(secs) = cli.io_timeout {
        mount = mount.io_timeout(Duration::from_secs(secs));
    }

    match cli.backend {
        Backend::Rest => {
            let source = RestSource::new(client).with_per_page(config.per_page);
            mount_and_wait(&cli, &runtime, source, mount)
        }
        Backend::Graphql => {
            let source = GraphQlSource::new(client).with_per_page(config.per_page);
            mount_and_wait(&cli, &runtime, source, mount)
        }
    }
}

/// Config file, then environment, then command line.
fn load_config(cli: &Cli) -> Result<RemoteConfig> {
    let mut config = RemoteConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = &cli.api_url {
        config.set_api_url(url)?;
    }
    if let Some(url) = &cli.graphql_url {
        config.set_graphql_url(url)?;
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    Ok(config)
}

/// Why the mount is coming down.
#[derive(Debug, Clone, Copy)]
enum Shutdown {
    Interrupted,
    Unmounted,
}

/// Authenticate, mount the filesystem and wait for Ctrl+C or an unmount.
fn mount_and_wait<R: RemoteSource>(
    cli: &Cli,
    runtime: &Runtime,
    source: R,
    config: MountConfig,
) -> Result<()> {
    let resolver = Arc::new(Resolver::new(Arc::new(source)));

    let viewer = runtime
        .block_on(resolver.viewer())
        .context("Authentication failed")?;
    info!(login = %viewer.login, backend = ?cli.backend, "Authenticated");

    let mut options = vec![
        fuser::MountOption::RO,
        fuser::MountOption::NoExec,
        fuser::MountOption::NoSuid,
        fuser::MountOption::FSName("github".to_string()),
        fuser::MountOption::Subtype("ghfs".to_string()),
        fuser::MountOption::AutoUnmount,
    ];

    #[cfg(target_os = "macos")]
    options.push(fuser::MountOption::CUSTOM("volname=GitHub".to_string()));

    if config.allow_other {
        options.push(fuser::MountOption::AllowOther);
    }

    // Woken by a signal, or by the session ending under an external umount.
    let (tx, rx) = mpsc::channel::<Shutdown>();
    let unmounted = tx.clone();
    ctrlc::set_handler(move || {
        let _ = tx.send(Shutdown::Interrupted);
    })
    .context("Failed to set signal handler")?;

    let fs = GithubFS::new(resolver, runtime.handle().clone(), config).on_destroy(move || {
        let _ = unmounted.send(Shutdown::Unmounted);
    });

    info!(mountpoint = %cli.mountpoint.display(), "Mounting filesystem (press Ctrl+C to unmount)");

    let session = fuser::spawn_mount2(fs, &cli.mountpoint, &options).map_err(|e| {
        error!(error = %e, "Mount failed");
        anyhow::anyhow!("Failed to mount filesystem: {e}")
    })?;

    info!("Filesystem mounted at {}", cli.mountpoint.display());

    match rx.recv() {
        Ok(Shutdown::Interrupted) => info!("Received interrupt signal, unmounting..."),
        Ok(Shutdown::Unmounted) => info!("Filesystem was unmounted externally"),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    drop(session);
    info!("Filesystem unmounted");
    Ok(())
}
