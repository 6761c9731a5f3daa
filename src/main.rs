use anyhow::Result;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = vkm::config::Cli::parse();
    let cmd = cli.command.clone().unwrap_or(vkm::config::Command::Run);

    match cmd {
        vkm::config::Command::Run => run_server(cli.config).await,
        vkm::config::Command::HashAdminToken(args) => {
            let hash = vkm::admin_token::hash_admin_token(&args.token)
                .map_err(|e| anyhow::anyhow!("hash admin token: {e}"))?;
            println!("{}", hash.as_str());
            Ok(())
        }
    }
}

async fn run_server(config: vkm::config::Config) -> Result<()> {
    let store = vkm::state::JsonSnapshotStore::load_or_init(vkm::state::StoreInit {
        data_dir: config.data_dir.clone(),
        bootstrap_server_ip: config.bootstrap_server_ip.clone(),
    })?;
    info!(
        users = store.state().users.len(),
        server_ip = %store.state().server_config.ip,
        "state loaded"
    );
    let store = Arc::new(Mutex::new(store));

    if !vkm::admin_token::AdminGate::new(config.admin_token_hash()).is_enabled() {
        warn!("no valid --admin-token-hash configured; server config updates are disabled");
    }

    let pinger: Arc<dyn vkm::probe::Pinger> =
        Arc::new(vkm::probe::SystemPinger::new(config.ping_bin.clone()));
    let resolver = Arc::new(vkm::geo::LocationResolver::from_geoip_path(
        config.geoip_db.as_deref(),
    ));

    let bind = config.bind;
    let data_dir = config.data_dir.clone();
    let probe = config.probe_options();

    let app = vkm::http::build_router(config, store, pinger, resolver)
        .layer(TraceLayer::new_for_http());

    info!(
        bind = %bind,
        data_dir = %data_dir.display(),
        probe_timeout_ms = probe.timeout.as_millis() as u64,
        probe_min_replies = probe.min_replies,
        version = vkm::version::VERSION,
        "starting vkm"
    );
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
