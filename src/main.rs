use crate::state::AppState;
use std::env;
use std::net::SocketAddr;
use tracing::info;

mod admission;
mod config;
mod dispatcher;
mod image_reference;
mod logging;
mod mutate;
mod namespace;
mod patch;
mod pod;
mod pvc;
mod state;
mod webserver;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = config::load_config(&config_path)?;

    let _log_guard = logging::init(&config.log)?;
    info!("Starting kube-mutate-image-policy {}", env!("CARGO_PKG_VERSION"));

    let rules = config.mutation_config()?;
    info!(
        "Loaded {} registry rules, image pull secret: {}, forced pull policy: {}, default storage class: {}, excluded namespaces: {:?}",
        rules.registries.len(),
        rules.image_pull_secret.as_deref().unwrap_or("<none>"),
        rules
            .forced_pull_policy
            .map(|policy| policy.as_str())
            .unwrap_or("<none>"),
        rules.default_storage_class.as_deref().unwrap_or("<none>"),
        rules.excluded_namespaces.patterns()
    );

    let app = webserver::create_app(AppState::new(rules));
    let addr = SocketAddr::new(config.host, config.port);
    webserver::serve(addr, &config.tls, app).await?;

    Ok(())
}
