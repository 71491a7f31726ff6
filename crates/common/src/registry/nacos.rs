//! Client for the Nacos naming HTTP API (v1 open API)

use super::{InstanceRegistration, ServiceInstance, ServiceRegistrar, ServiceRegistry};
use crate::config::validate_registry_addr;
use crate::error::{LlmGateError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE_LIST_PATH: &str = "/nacos/v1/ns/service/list";
const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";
const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";

/// Services fetched per page when listing a group
const PAGE_SIZE: usize = 500;

/// Beat response code for an instance the server no longer knows
const INSTANCE_NOT_FOUND: i64 = 20404;

#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    doms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    #[serde(default)]
    hosts: Vec<NacosHost>,
}

#[derive(Debug, Deserialize)]
struct NacosHost {
    ip: String,
    port: u16,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default = "default_true")]
    healthy: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct BeatResponse {
    #[serde(default)]
    code: i64,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Registry backed by a Nacos server
#[derive(Debug, Clone)]
pub struct NacosRegistry {
    client: Client,
    base_url: String,
}

impl NacosRegistry {
    /// Create a client for `host:port` (an `http://` prefix is accepted)
    pub fn new(server_addr: &str, timeout: Duration) -> Result<Self> {
        validate_registry_addr(server_addr)?;
        let base_url = if server_addr.starts_with("http://") || server_addr.starts_with("https://")
        {
            server_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", server_addr)
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmGateError::registry(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| LlmGateError::registry(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmGateError::registry(format!(
                "{} returned {}: {}",
                what,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }

    fn instance_query(instance: &InstanceRegistration) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", instance.service_name.clone()),
            ("groupName", instance.group.clone()),
            ("ip", instance.ip.clone()),
            ("port", instance.port.to_string()),
            ("weight", instance.effective_weight().to_string()),
            ("ephemeral", "true".to_string()),
        ]
    }
}

#[async_trait]
impl ServiceRegistry for NacosRegistry {
    async fn list_services(&self, group: &str) -> Result<Vec<String>> {
        let mut services = Vec::new();
        let mut page = 1usize;

        loop {
            let request = self.request(Method::GET, SERVICE_LIST_PATH).query(&[
                ("pageNo", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("groupName", group.to_string()),
            ]);
            let list: ServiceList = self
                .send(request, "List services")
                .await?
                .json()
                .await
                .map_err(|e| LlmGateError::registry(format!("Invalid service list: {}", e)))?;

            let doms = list.doms.unwrap_or_default();
            let fetched = doms.len();
            services.extend(doms);

            if fetched < PAGE_SIZE || services.len() >= list.count {
                break;
            }
            page += 1;
        }

        debug!(group = %group, count = services.len(), "Listed registry services");
        Ok(services)
    }

    async fn list_instances(&self, service: &str, group: &str) -> Result<Vec<ServiceInstance>> {
        let request = self.request(Method::GET, INSTANCE_LIST_PATH).query(&[
            ("serviceName", service),
            ("groupName", group),
            ("healthyOnly", "true"),
        ]);
        let list: InstanceList = self
            .send(request, "List instances")
            .await?
            .json()
            .await
            .map_err(|e| LlmGateError::registry(format!("Invalid instance list: {}", e)))?;

        Ok(list
            .hosts
            .into_iter()
            .filter(|h| h.enabled)
            .map(|h| ServiceInstance {
                ip: h.ip,
                port: h.port,
                weight: h.weight,
                healthy: h.healthy,
            })
            .collect())
    }
}

#[async_trait]
impl ServiceRegistrar for NacosRegistry {
    async fn register(&self, instance: &InstanceRegistration) -> Result<()> {
        let request = self
            .request(Method::POST, INSTANCE_PATH)
            .query(&Self::instance_query(instance));
        self.send(request, "Register instance").await?;
        debug!(
            service = %instance.service_name,
            port = instance.port,
            "Registered instance"
        );
        Ok(())
    }

    async fn heartbeat(&self, instance: &InstanceRegistration) -> Result<()> {
        let beat = serde_json::json!({
            "serviceName": format!("{}@@{}", instance.group, instance.service_name),
            "ip": instance.ip,
            "port": instance.port,
            "weight": instance.effective_weight(),
            "cluster": "DEFAULT",
            "scheduled": true,
        });
        let mut query = Self::instance_query(instance);
        query.push(("beat", beat.to_string()));

        let request = self.request(Method::PUT, BEAT_PATH).query(&query);
        let response = self.send(request, "Instance heartbeat").await?;

        // Older servers answer with plain text; only a JSON "not found" is an error
        let body = response.text().await.unwrap_or_default();
        if let Ok(beat) = serde_json::from_str::<BeatResponse>(&body) {
            if beat.code == INSTANCE_NOT_FOUND {
                warn!(service = %instance.service_name, "Registry lost instance");
                return Err(LlmGateError::registry(format!(
                    "Instance {}:{} of {} not registered",
                    instance.ip, instance.port, instance.service_name
                )));
            }
        }
        Ok(())
    }

    async fn deregister(&self, instance: &InstanceRegistration) -> Result<()> {
        let request = self
            .request(Method::DELETE, INSTANCE_PATH)
            .query(&Self::instance_query(instance));
        self.send(request, "Deregister instance").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn registration() -> InstanceRegistration {
        InstanceRegistration {
            service_name: "llava:7b".to_string(),
            group: "MODEL_GROUP".to_string(),
            ip: "10.0.0.5".to_string(),
            port: 20020,
            weight: 0,
        }
    }

    #[test]
    fn test_new_accepts_plain_and_http_addresses() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            NacosRegistry::new("127.0.0.1:8848", timeout).unwrap().base_url(),
            "http://127.0.0.1:8848"
        );
        assert_eq!(
            NacosRegistry::new("http://nacos:8848/", timeout).unwrap().base_url(),
            "http://nacos:8848"
        );
        assert!(NacosRegistry::new("nacos", timeout).is_err());
    }

    #[tokio::test]
    async fn test_list_services_preserves_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", SERVICE_LIST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("groupName".into(), "MODEL_GROUP".into()),
                Matcher::UrlEncoded("pageNo".into(), "1".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"count":2,"doms":["mistral-svc","llama2-svc"]}"#)
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        let services = registry.list_services("MODEL_GROUP").await.unwrap();

        assert_eq!(services, vec!["mistral-svc", "llama2-svc"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_services_null_doms_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", SERVICE_LIST_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"count":0,"doms":null}"#)
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(registry.list_services("EMPTY").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_services_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", SERVICE_LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        let err = registry.list_services("MODEL_GROUP").await.unwrap_err();
        assert!(matches!(err, LlmGateError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_list_instances_skips_disabled() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", INSTANCE_LIST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("serviceName".into(), "llava:7b".into()),
                Matcher::UrlEncoded("healthyOnly".into(), "true".into()),
            ]))
            .with_body(
                r#"{"hosts":[
                    {"ip":"10.0.0.5","port":20020,"weight":1.0,"healthy":true,"enabled":true},
                    {"ip":"10.0.0.6","port":20021,"weight":1.0,"healthy":true,"enabled":false}
                ]}"#,
            )
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        let instances = registry
            .list_instances("llava:7b", "MODEL_GROUP")
            .await
            .unwrap();

        assert_eq!(instances, vec![ServiceInstance::new("10.0.0.5", 20020)]);
        assert_eq!(instances[0].endpoint(), "http://10.0.0.5:20020");
    }

    #[tokio::test]
    async fn test_register_sends_neutral_weight() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", INSTANCE_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("serviceName".into(), "llava:7b".into()),
                Matcher::UrlEncoded("port".into(), "20020".into()),
                Matcher::UrlEncoded("weight".into(), "1".into()),
            ]))
            .with_body("ok")
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        registry.register(&registration()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_instance_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", BEAT_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"clientBeatInterval":5000,"code":20404}"#)
            .create_async()
            .await;

        let registry = NacosRegistry::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(registry.heartbeat(&registration()).await.is_err());
    }
}
