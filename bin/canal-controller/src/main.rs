use anyhow::Result;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use canal_api::names::MESH_CONFIG_KEY;
use canal_core::config::LogFormat;
use canal_core::{ClusterStore, ControllerConfig, KubeStore, Manager, MeshConfig, Metrics};
use canal_pki::CertificateManager;
use canal_webhook::{default_registry, register_configurations, serve_admission, serve_metrics, tls_config, WebhookTarget};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Read the mesh config from its ConfigMap; defaults when the ConfigMap or key is missing
async fn load_mesh_config(store: &KubeStore, config: &ControllerConfig) -> Result<MeshConfig> {
    let configmap: Option<ConfigMap> = store.get(&config.namespace, &config.mesh_config_name).await?;
    let data = configmap
        .and_then(|cm| cm.data)
        .and_then(|mut data| data.remove(MESH_CONFIG_KEY));

    match data {
        Some(json) => Ok(MeshConfig::from_json(&json)?),
        None => {
            warn!(
                "ConfigMap {}/{} has no {}, using defaults",
                config.namespace, config.mesh_config_name, MESH_CONFIG_KEY
            );
            Ok(MeshConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting canal-controller...");

    let client = Client::try_default().await?;
    let store = Arc::new(KubeStore::new(client.clone()));
    let metrics = Metrics::new()?;

    let mesh_config = load_mesh_config(&store, &config).await?;
    info!("Mesh config loaded, certificate manager {:?}", mesh_config.certificate.manager);

    let pki = CertificateManager::from_config(store.clone(), &config.namespace, &mesh_config).await?;
    let webhook_host = config.webhook_host();
    let cert = pki
        .issue_certificate(&webhook_host, pki.service_validity(), &[webhook_host.clone()])
        .await?;
    info!("Issued webhook certificate for {}", webhook_host);

    let registry = Arc::new(default_registry(&config.mesh_config_name).with_metrics(metrics.clone()));
    let target = WebhookTarget {
        service_namespace: config.namespace.clone(),
        service_name: config.webhook_service_name.clone(),
        port: i32::from(config.webhook_port),
        ca_bundle: cert.ca_bundle.clone(),
        namespace_selector: mesh_config.webhook.namespace_selector.clone(),
    };
    register_configurations(store.as_ref(), &registry, &target).await?;
    info!("Registered {} admission hooks", registry.descriptors().len());

    let webhook_addr: SocketAddr = ([0, 0, 0, 0], config.webhook_port).into();
    let webhook_listener = TcpListener::bind(&webhook_addr).await?;
    info!("Webhook server listening on {}", webhook_addr);
    let tls = tls_config(&cert.cert_pem, &cert.key_pem)?;
    tokio::task::spawn(serve_admission(webhook_listener, tls, registry));

    let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
    let metrics_listener = TcpListener::bind(&metrics_addr).await?;
    info!("Metrics server listening on {}", metrics_addr);
    tokio::task::spawn(serve_metrics(metrics_listener, metrics.clone()));

    let manager = canal_mcs::setup_with_manager(Manager::new(client, metrics), store, &mesh_config);
    info!("Controllers: {}", manager.controller_names().join(", "));

    // Runs until a shutdown signal stops every controller
    manager.start().await;
    info!("Shutdown signal received, exiting...");

    Ok(())
}
