//! Walks a full session lifecycle against a real identity gateway: verify,
//! optional password login from the environment, an authorized API call
//! through the request hook, then logout. Prometheus counters are dumped at
//! the end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use meridian_session::{
    Password, RecordedNavigation, RequestAuthorizer, SessionController, Settings,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// `--config <path>` wins, then `MERIDIAN_CONFIG`, then `meridian.toml`.
fn resolve_config_path(args: &[String]) -> PathBuf {
    if let Some(position) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(position + 1) {
            return PathBuf::from(path);
        }
    }
    if let Ok(path) = std::env::var("MERIDIAN_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("meridian.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let args: Vec<String> = std::env::args().collect();
    let config_path = resolve_config_path(&args);
    let settings = Settings::from_file(&config_path)
        .with_context(|| format!("loading settings from {}", config_path.display()))?;
    info!(config = %config_path.display(), "settings loaded");

    let navigator = Arc::new(RecordedNavigation::new(
        url::Url::parse("http://localhost:3000/").context("parsing the demo start URL")?,
    ));

    let controller = SessionController::builder(settings)
        .navigator(navigator.clone())
        .default_error_handler(Arc::new(|e| warn!(error = %e, "session error")))
        .build()
        .await
        .context("building the session controller")?;
    let authorizer = RequestAuthorizer::ensure_installed(controller.clone());

    if let Err(e) = controller.verify(None).await {
        match controller.default_error_handler() {
            Some(handler) => handler(&e),
            None => warn!(error = %e, "verification failed"),
        }
    }
    let session = controller.session();
    info!(
        phase = session.phase(),
        authenticated = session.is_authenticated,
        "session verified"
    );

    if let Some(target) = navigator.take_redirect() {
        info!(%target, "a federated handoff was requested; open this URL to continue");
    }

    match (
        std::env::var("MERIDIAN_USERNAME"),
        std::env::var("MERIDIAN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => {
            let password = Password::new(password);
            match controller.login(&username, &password, true).await {
                Ok(_) => info!(username, "logged in"),
                Err(e) => match controller.default_error_handler() {
                    Some(handler) => handler(&e),
                    None => warn!(error = %e, "login failed"),
                },
            }
        }
        _ => info!("MERIDIAN_USERNAME/MERIDIAN_PASSWORD not set, staying on the current session"),
    }

    let client = reqwest::Client::new();
    let request = client.get(format!("{}/me", controller.base_api_url()));
    match authorizer.authorize(request).await {
        Ok(request) => match request.send().await {
            Ok(response) => info!(status = %response.status(), "authorized request completed"),
            Err(e) => warn!(error = %e, "authorized request failed"),
        },
        Err(e) => warn!(error = %e, "could not authorize the request"),
    }

    controller.logout().await.context("logging out")?;
    info!("logged out");

    println!("{}", prometheus.render());
    Ok(())
}
