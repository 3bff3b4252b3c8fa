//! HTTPS admission endpoint and the plain HTTP metrics endpoint

use std::fmt;
use std::io::BufReader;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use kube::api::DynamicObject;
use kube::core::admission::AdmissionReview;
use rustls::pki_types::PrivateKeyDer;
use rustls::ServerConfig;
use rustls_pemfile::{certs, read_all, Item};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use canal_core::Metrics;

use crate::registry::HookRegistry;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Failed to parse certificates: {0}")]
    Certificate(String),

    #[error("No private key found in PEM data")]
    MissingKey,

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Kubernetes error: {0}")]
    Store(#[from] canal_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration for a PEM certificate chain and private key
pub fn tls_config(cert_pem: &str, key_pem: &str) -> Result<Arc<ServerConfig>, WebhookError> {
    let chain = certs(&mut BufReader::new(cert_pem.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WebhookError::Certificate(e.to_string()))?;
    if chain.is_empty() {
        return Err(WebhookError::Certificate("no certificates found in PEM data".to_string()));
    }

    let mut key = None;
    for item in read_all(&mut BufReader::new(key_pem.as_bytes())) {
        match item? {
            Item::Pkcs8Key(k) => {
                key = Some(PrivateKeyDer::Pkcs8(k));
                break;
            }
            Item::Pkcs1Key(k) => {
                key = Some(PrivateKeyDer::Pkcs1(k));
                break;
            }
            Item::Sec1Key(k) => {
                key = Some(PrivateKeyDer::Sec1(k));
                break;
            }
            _ => {}
        }
    }
    let key = key.ok_or(WebhookError::MissingKey)?;
    debug!(certificates = chain.len(), "Loaded webhook certificate");

    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    Ok(Arc::new(config))
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    respond(status, "text/plain", body)
}

/// Route one request to the admission hooks
pub async fn handle_admission<B>(req: Request<B>, registry: &HookRegistry) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: fmt::Display,
{
    let path = req.uri().path().to_string();
    debug!("{} {}", req.method(), path);

    if path == "/healthz" {
        return plain(StatusCode::OK, "OK\n");
    }
    if registry.route(&path).is_none() {
        return plain(StatusCode::NOT_FOUND, "Not Found\n");
    }
    if req.method() != Method::POST {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Error reading admission body: {}", e);
            return plain(StatusCode::BAD_REQUEST, "Bad Request\n");
        }
    };
    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            warn!(path = %path, error = %e, "Undecodable admission review");
            return respond(StatusCode::BAD_REQUEST, "text/plain", format!("{}\n", e));
        }
    };

    match registry.review(&path, review).map(|r| serde_json::to_vec(&r)) {
        Some(Ok(json)) => respond(StatusCode::OK, "application/json", json),
        Some(Err(e)) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", format!("{}\n", e)),
        None => plain(StatusCode::NOT_FOUND, "Not Found\n"),
    }
}

/// Route one request to the metrics or health endpoint
pub async fn handle_metrics<B>(req: Request<B>, metrics: &Metrics) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let text = metrics
                .gather()
                .unwrap_or_else(|_| "Failed to gather metrics\n".to_string());
            respond(StatusCode::OK, "text/plain; version=0.0.4", text)
        }
        (&Method::GET, "/healthz") => plain(StatusCode::OK, "OK\n"),
        _ => plain(StatusCode::NOT_FOUND, "Not Found\n"),
    }
}

/// Accept TLS connections and answer admission reviews until the task is dropped
pub async fn serve_admission(listener: TcpListener, tls: Arc<ServerConfig>, registry: Arc<HookRegistry>) {
    let acceptor = TlsAcceptor::from(tls);
    if let Ok(addr) = listener.local_addr() {
        info!("Admission webhooks listening on https://{}", addr);
    }

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Error accepting HTTPS connection: {}", e);
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let registry = registry.clone();

        tokio::task::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(e) => {
                    debug!("TLS error from {}: {}", peer_addr, e);
                    return;
                }
            };
            let service = service_fn(move |req| {
                let registry = registry.clone();
                async move { Ok::<_, hyper::Error>(handle_admission(req, &registry).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                debug!("Error serving HTTPS connection from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Serve `/metrics` and `/healthz` over plain HTTP until the task is dropped
pub async fn serve_metrics(listener: TcpListener, metrics: Metrics) {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics listening on http://{}", addr);
    }

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Error accepting HTTP connection: {}", e);
                continue;
            }
        };
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { Ok::<_, hyper::Error>(handle_metrics(req, &metrics).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::GlobalTrafficPolicyHook;
    use canal_pki::archon::{issue_leaf, new_root_ca, RootCaSettings};
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> HookRegistry {
        HookRegistry::new().register(GlobalTrafficPolicyHook)
    }

    fn request(method: Method, path: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(body.into()))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_unknown_paths() {
        let registry = registry();
        let resp = handle_admission(request(Method::GET, "/healthz", ""), &registry).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = handle_admission(request(Method::POST, "/validate-unknown", "{}"), &registry).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = handle_admission(
            request(Method::GET, "/validate-flomesh-io-v1alpha1-globaltrafficpolicy", ""),
            &registry,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = handle_admission(
            request(Method::POST, "/validate-flomesh-io-v1alpha1-globaltrafficpolicy", "not json"),
            &registry,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_review_round_trip() {
        let review = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "0df28fbd-5f5f-11e8-b7cc-42010a800002",
                "kind": {"group": "flomesh.io", "version": "v1alpha1", "kind": "GlobalTrafficPolicy"},
                "resource": {"group": "flomesh.io", "version": "v1alpha1", "resource": "globaltrafficpolicies"},
                "name": "s",
                "namespace": "a",
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": {
                    "apiVersion": "flomesh.io/v1alpha1",
                    "kind": "GlobalTrafficPolicy",
                    "metadata": {"name": "s", "namespace": "a"},
                    "spec": {"lbType": "FailOver", "targets": []}
                },
                "dryRun": false
            }
        });
        let resp = handle_admission(
            request(
                Method::POST,
                "/validate-flomesh-io-v1alpha1-globaltrafficpolicy",
                serde_json::to_vec(&review).unwrap(),
            ),
            &registry(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("application/json")
        );

        let body = body_json(resp).await;
        assert_eq!(body["kind"], json!("AdmissionReview"));
        assert_eq!(body["response"]["uid"], json!("0df28fbd-5f5f-11e8-b7cc-42010a800002"));
        assert_eq!(body["response"]["allowed"], json!(false));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Metrics::new().unwrap();
        metrics.record_admission("validate-globaltrafficpolicy", "CREATE", true);

        let resp = handle_metrics(request(Method::GET, "/metrics", ""), &metrics).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("canal_admission_requests_total"));

        let resp = handle_metrics(request(Method::POST, "/metrics", ""), &metrics).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_tls_config_from_issued_certificate() {
        let settings = RootCaSettings {
            common_name: "flomesh.io".to_string(),
            validity: Duration::from_secs(86400),
            country: "CN".to_string(),
            locality: "Haidian".to_string(),
            organization: "flomesh.io".to_string(),
        };
        let root = new_root_ca(&settings).unwrap();
        let host = "erie-canal-webhook-service.flomesh.svc".to_string();
        let leaf = issue_leaf(&root, &host, Duration::from_secs(3600), &[host.clone()]).unwrap();

        assert!(tls_config(&leaf.cert_pem, &leaf.key_pem).is_ok());
        assert!(matches!(
            tls_config(&leaf.cert_pem, ""),
            Err(WebhookError::MissingKey)
        ));
        assert!(matches!(
            tls_config("", &leaf.key_pem),
            Err(WebhookError::Certificate(_))
        ));
    }
}
