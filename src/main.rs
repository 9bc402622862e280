use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use localpod::config::Config;
use localpod::control::ControlService;
use localpod::pod::{CertificateCache, PodRegistry, SelfSignedProvider, YamlFileStore};
use localpod::server::listener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localpod=info".into()),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let store = Arc::new(YamlFileStore::new(&cfg.state_path));
    let certificates = cfg.tls.enabled.then(|| {
        Arc::new(CertificateCache::new(Arc::new(SelfSignedProvider::new(
            cfg.tls.hosts.clone(),
        ))))
    });
    let registry = Arc::new(PodRegistry::new(store, certificates, cfg.pod_bind_ip));
    registry
        .load_at_startup()
        .await
        .with_context(|| format!("loading pods from {}", cfg.state_path.display()))?;

    let socket = TcpListener::bind(&cfg.control.listen_addr)
        .await
        .with_context(|| format!("binding control plane on {}", cfg.control.listen_addr))?;
    tracing::info!(
        "The control plane is available at http://{}",
        cfg.control_host()
    );

    let control = Arc::new(ControlService::new(Arc::clone(&registry), cfg.control_host()));
    let (shutdown, shutdown_rx) = oneshot::channel();
    let server = tokio::spawn(listener::run(socket, None, control, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown.send(());
    let _ = server.await;
    registry.shutdown().await;

    Ok(())
}
