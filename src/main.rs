use clap::Parser;
use tracing_subscriber::EnvFilter;

use tnfsd::config::{Cli, Config};
use tnfsd::dispatcher::Dispatcher;
use tnfsd::transport;
use tnfsd::vfs::NativeFs;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let root = match config.root.canonicalize() {
        Ok(p) if p.is_dir() => p,
        Ok(p) => {
            tracing::error!(root = %p.display(), "export root is not a directory");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(root = %config.root.display(), error = %e, "cannot resolve export root");
            std::process::exit(1);
        }
    };

    tracing::info!(root = %root.display(), port = config.port, "starting tnfsd");

    let dispatcher = Dispatcher::new(
        root,
        Box::new(NativeFs::new()),
        config.max_sessions,
        std::time::Duration::from_secs(config.session_timeout_secs),
        config.retry_timeout_ms,
    );

    if let Err(e) = transport::run(dispatcher, config.port).await {
        tracing::error!(error = %e, "tnfsd exited with error");
        std::process::exit(1);
    }
}
