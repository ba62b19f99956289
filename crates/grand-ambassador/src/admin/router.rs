//! Route dispatch for the admin server.

use super::types::{json_response, not_found, ProxiesResponse};
use crate::metrics::collect_metrics;
use crate::registry::ProxyRegistry;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// hyper entry point
pub async fn route_request(
    req: Request<Incoming>,
    registry: Arc<ProxyRegistry>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    debug!("Admin: {} {}", req.method(), req.uri().path());
    Ok(route(req.method(), req.uri().path(), &registry))
}

/// Route by method and path. Request bodies are never read.
pub fn route(method: &Method, path: &str, registry: &ProxyRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => {
            json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
        }
        (&Method::GET, "/proxies") => {
            let groups = registry.list().iter().map(|group| group.status()).collect();
            json_response(StatusCode::OK, &ProxiesResponse { groups })
        }
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(collect_metrics())))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
        _ => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{PortSpec, WorkloadDescriptor};
    use crate::registry::ProxyGroupSpec;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let registry = ProxyRegistry::new();
        let response = route(&Method::GET, "/health", &registry);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_proxies_lists_groups() {
        let registry = ProxyRegistry::new();
        let descriptor = WorkloadDescriptor {
            id: "0123456789abcdef".to_string(),
            name: "web".to_string(),
            running: true,
            address: Some("127.0.0.2".parse().unwrap()),
            ports: [PortSpec::tcp(0)].into_iter().collect(),
        };
        let spec = ProxyGroupSpec::from_descriptor(&descriptor, "127.0.0.1".parse().unwrap())
            .unwrap();
        registry.add(spec).await.unwrap();

        let json = body_json(route(&Method::GET, "/proxies", &registry)).await;
        assert_eq!(json["groups"][0]["workloadName"], "web");
        assert_eq!(json["groups"][0]["instances"][0]["state"], "created");

        registry.stop_all().await;
        let json = body_json(route(&Method::GET, "/proxies", &registry)).await;
        assert_eq!(json["groups"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_metrics_is_plain_text() {
        let registry = ProxyRegistry::new();
        let response = route(&Method::GET, "/metrics", &registry);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("Content-Type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let registry = ProxyRegistry::new();
        assert_eq!(
            route(&Method::GET, "/containers", &registry).status(),
            StatusCode::NOT_FOUND
        );
        let response = route(&Method::POST, "/health", &registry);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["errors"][0]["code"], "404");
    }
}
