//! Keymask - an HTTPS proxy that masks secrets in LLM traffic.
//!
//! `keymask` runs the proxy; `keymask generate-ca` mints the root
//! certificate; `keymask version` prints build information.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use keymask_app::{AppConfig, AuditLog, ManagementServer};
use keymask_core::detect::{DetectorManager, EntropyDetector, PatternDetector};
use keymask_core::metrics::Metrics;
use keymask_core::placeholder::PlaceholderCodec;
use keymask_core::protocol::ProtocolRegistry;
use keymask_proxy::{CertificateAuthority, MintingResolver, ProxyConfig, ProxyServer, SecretService};
use keymask_storage::{MappingStore, MemoryStore, RedisStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_COMMIT: &str = match option_env!("KEYMASK_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
const BUILD_TIME: &str = match option_env!("KEYMASK_BUILD_TIME") {
    Some(time) => time,
    None => "unknown",
};

#[derive(Parser)]
#[command(name = "keymask", about = "HTTPS proxy that masks secrets in LLM traffic")]
struct Cli {
    /// Path to the configuration file, relative to the working directory.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, commit, and build time.
    Version,
    /// Generate a new root CA certificate and key.
    GenerateCa {
        /// Certificate output path.
        cert_path: Option<PathBuf>,
        /// Private key output path.
        key_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("Keymask {VERSION}");
            println!("Git Commit: {GIT_COMMIT}");
            println!("Build Time: {BUILD_TIME}");
            Ok(())
        }
        Some(Commands::GenerateCa {
            cert_path,
            key_path,
        }) => {
            let cert = cert_path.unwrap_or_else(|| PathBuf::from("./certs/ca.crt"));
            let key = key_path.unwrap_or_else(|| PathBuf::from("./certs/ca.key"));
            if let Err(e) = CertificateAuthority::generate(&cert, &key) {
                eprintln!("Failed to generate CA: {e}");
                std::process::exit(1);
            }
            println!("CA certificate generated:");
            println!("  Certificate: {}", cert.display());
            println!("  Key: {}", key.display());
            Ok(())
        }
        None => run(cli.config).await,
    }
}

/// Builds every component from configuration and serves until a signal.
async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let base_dir = std::env::current_dir()?;
    let config = AppConfig::load(&config_path, &base_dir)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "keymask={0},keymask_core={0},keymask_proxy={0},keymask_storage={0},keymask_app={0}",
            config.logging.level
        )))
        .init();

    tracing::info!(version = VERSION, commit = GIT_COMMIT, "starting Keymask");

    // Root CA, generated on first run.
    let ca = Arc::new(CertificateAuthority::load_or_generate(
        &config.tls.ca_cert,
        &config.tls.ca_key,
    )?);
    tracing::info!(cert = %config.tls.ca_cert.display(), "root CA loaded");

    let metrics = Arc::new(Metrics::new());

    // Detectors.
    let mut manager = DetectorManager::new().with_metrics(Arc::clone(&metrics));
    let mut pattern = PatternDetector::new();
    pattern.configure(&config.interceptors.pattern);
    manager.register(Box::new(pattern));
    if config.interceptors.entropy.enabled {
        manager.register(Box::new(EntropyDetector::from_config(
            &config.interceptors.entropy,
        )));
    }
    if config.interceptors.bitwarden.enabled {
        tracing::warn!("bitwarden interceptor is reserved and not yet wired; ignoring");
    }

    // Mapping store.
    let store: Arc<dyn MappingStore> = match config.storage.r#type.as_str() {
        "memory" => Arc::new(MemoryStore::new(config.storage.ttl())),
        "redis" => Arc::new(
            RedisStore::connect(
                &config.storage.redis.address,
                &config.storage.redis.password,
                config.storage.redis.db,
                config.storage.ttl(),
            )
            .await?,
        ),
        other => anyhow::bail!("unknown storage type {other:?} (expected \"memory\" or \"redis\")"),
    };
    tracing::info!(backend = %config.storage.r#type, ttl_secs = config.storage.ttl_secs, "mapping store ready");

    // Secret service with audit hook.
    let codec = Arc::new(PlaceholderCodec::new(
        config.placeholder.prefix.clone(),
        config.placeholder.suffix.clone(),
    ));
    let audit = Arc::new(AuditLog::from_config(&config.logging.audit)?);
    let service = SecretService::new(
        Arc::new(manager),
        codec,
        Arc::clone(&store),
        Arc::new(ProtocolRegistry::with_defaults()),
        Arc::clone(&metrics),
    );
    let service = if audit.is_enabled() {
        let detect_audit = Arc::clone(&audit);
        let restore_audit = Arc::clone(&audit);
        Arc::new(
            service
                .on_detection(move |host, findings| {
                    detect_audit.record_detections(host, findings);
                })
                .on_restoration(move |host, restored, not_found| {
                    restore_audit.record_restoration(host, restored, not_found);
                }),
        )
    } else {
        Arc::new(service)
    };

    // Proxy engine.
    let resolver = Arc::new(MintingResolver::new(Arc::clone(&ca)));
    let proxy = ProxyServer::new(
        ProxyConfig {
            listen: config.proxy.listen.clone(),
            max_body_bytes: config.proxy.max_body_bytes,
            ..ProxyConfig::default()
        },
        resolver,
        Arc::clone(&service),
    )?;
    let shutdown = proxy.shutdown_handle();

    // Management surface.
    if config.metrics.enabled {
        let management = ManagementServer::new(
            Arc::clone(&metrics),
            Arc::clone(&store),
            &config.metrics.endpoint,
            config.metrics.port,
            VERSION,
        );
        tokio::spawn(async move {
            if let Err(e) = management.run().await {
                tracing::error!(error = %e, "management server failed");
            }
        });
    }

    // Keep the store-size gauge current.
    {
        let metrics = Arc::clone(&metrics);
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(10));
            loop {
                tick.tick().await;
                metrics.mapping_store_size.set(store.size().await as i64);
            }
        });
    }

    // Signal handling: first signal drains, letting the engine's drain
    // window bound how long that takes.
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler installs");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown.send(());
    });

    tracing::info!(listen = %config.proxy.listen, "proxy starting");
    proxy.run().await?;

    store.close().await.ok();
    tracing::info!("shutdown complete");
    Ok(())
}
