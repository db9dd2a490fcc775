//! `reqwest`-backed [`Registry`], speaking the SPARQL 1.1 Protocol over
//! HTTP, grounded on `api/client.rs`'s `HttpClient`: a `Client` built
//! once, fixed `Accept`/`Content-Type` headers per request, errors mapped
//! through a `thiserror` enum.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Registry, RegistryError, RegistryResult};
use crate::model::{Container, ContainerStatus, Monitor, MonitorStatus, MONITOR_LABEL_KEY};

const PREFIXES: &str = concat!(
    "PREFIX docker: <https://w3.org/ns/bde/docker#>\n",
    "PREFIX logger: <http://mu.semte.ch/vocabularies/ext/docker-logger/>\n",
    "PREFIX mu: <http://mu.semte.ch/vocabularies/core/>\n",
);

/// SPARQL 1.1 Protocol client for the monitor registry.
pub struct SparqlRegistry {
    client: Client,
    endpoint: String,
    graph: String,
    container_filter: String,
}

impl SparqlRegistry {
    pub fn new(endpoint: String, graph: String, container_filter: String) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            graph,
            container_filter,
        })
    }

    async fn query(&self, query: &str) -> RegistryResult<Value> {
        let full = format!("{PREFIXES}{query}");
        debug!("registry query: {}", full);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", full.as_str())])
            .send()
            .await?;

        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| RegistryError::Malformed(format!("{e}: {body}")))
    }

    async fn update(&self, update: &str) -> RegistryResult<()> {
        let full = format!("{PREFIXES}{update}");
        debug!("registry update: {}", full);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("update", full.as_str())])
            .send()
            .await?;

        response.error_for_status()?;
        Ok(())
    }

    fn bindings<'a>(results: &'a Value) -> impl Iterator<Item = &'a Value> {
        results
            .get("results")
            .and_then(|r| r.get("bindings"))
            .and_then(|b| b.as_array())
            .into_iter()
            .flatten()
    }

    fn binding_str(binding: &Value, key: &str) -> Option<String> {
        binding
            .get(key)
            .and_then(|v| v.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn monitor_from_binding(binding: &Value) -> Option<Monitor> {
        Some(Monitor {
            uri: Self::binding_str(binding, "uri")?,
            id: Self::binding_str(binding, "id")?,
            status: match Self::binding_str(binding, "status")?.as_str() {
                "creating" => MonitorStatus::Creating,
                "running" => MonitorStatus::Running,
                "removed" => MonitorStatus::Removed,
                other => {
                    warn!("unknown monitor status {}", other);
                    MonitorStatus::Removed
                }
            },
            docker_container: Self::binding_str(binding, "dockerContainer")?,
            persisted: true,
        })
    }
}

#[async_trait::async_trait]
impl Registry for SparqlRegistry {
    async fn find_all(&self, status: Option<MonitorStatus>) -> RegistryResult<Vec<Monitor>> {
        let filter = match status {
            Some(s) => format!("FILTER(?status = \"{s}\")"),
            None => String::new(),
        };

        let results = self
            .query(&format!(
                "SELECT ?uri ?id ?status ?dockerContainer FROM <{}> WHERE {{ \
                 ?uri a logger:NetworkMonitor; mu:uuid ?id; logger:status ?status; \
                 logger:monitors ?dockerContainer. {filter} }}",
                self.graph
            ))
            .await?;

        Ok(Self::bindings(&results)
            .filter_map(Self::monitor_from_binding)
            .collect())
    }

    async fn find_by_logged_container(&self, uri: &str) -> RegistryResult<Option<Monitor>> {
        let results = self
            .query(&format!(
                "SELECT ?uri ?id ?status ?dockerContainer FROM <{}> WHERE {{ \
                 ?uri a logger:NetworkMonitor; mu:uuid ?id; logger:status ?status; \
                 logger:monitors <{}>. BIND(<{}> AS ?dockerContainer) \
                 FILTER(?status = \"running\") }}",
                self.graph, uri, uri
            ))
            .await?;

        Ok(Self::bindings(&results).find_map(Self::monitor_from_binding))
    }

    async fn find_by_monitor_host(&self, container_id: &str) -> RegistryResult<Option<Monitor>> {
        let results = self
            .query(&format!(
                "SELECT ?uri ?id ?status ?dockerContainer FROM <{}> WHERE {{ \
                 ?uri a logger:NetworkMonitor; mu:uuid \"{}\"; logger:status ?status; \
                 logger:monitors ?dockerContainer. BIND(\"{}\" AS ?id) }}",
                self.graph, container_id, container_id
            ))
            .await?;

        Ok(Self::bindings(&results).find_map(Self::monitor_from_binding))
    }

    async fn get_logged_container(&self, monitor: &Monitor) -> RegistryResult<Option<Container>> {
        let results = self
            .query(&format!(
                "SELECT ?id ?name ?image ?project ?status FROM <{}> WHERE {{ \
                 <{}> a docker:Container; docker:id ?id; docker:name ?name; docker:image ?image. \
                 OPTIONAL {{ <{}> docker:project ?project }} \
                 OPTIONAL {{ <{}> docker:state/docker:status ?status }} }}",
                self.graph,
                monitor.docker_container,
                monitor.docker_container,
                monitor.docker_container
            ))
            .await?;

        Ok(Self::bindings(&results).next().and_then(|b| {
            Some(Container {
                uri: monitor.docker_container.clone(),
                id: Self::binding_str(b, "id")?,
                name: Self::binding_str(b, "name")?,
                image: Self::binding_str(b, "image")?,
                project: Self::binding_str(b, "project"),
                status: Self::binding_str(b, "status")
                    .map(|s| ContainerStatus::from(s.as_str()))
                    .unwrap_or(ContainerStatus::None),
            })
        }))
    }

    async fn find_container_by_state(&self, state_uri: &str) -> RegistryResult<Option<Container>> {
        let results = self
            .query(&format!(
                "SELECT ?uri ?id ?name ?image FROM <{}> WHERE {{ \
                 ?uri docker:state <{}>; docker:id ?id; docker:name ?name; docker:image ?image. }}",
                self.graph, state_uri
            ))
            .await?;

        Ok(Self::bindings(&results).find_map(|b| {
            Some(Container {
                uri: Self::binding_str(b, "uri")?,
                id: Self::binding_str(b, "id")?,
                name: Self::binding_str(b, "name")?,
                image: Self::binding_str(b, "image")?,
                project: None,
                status: ContainerStatus::None,
            })
        }))
    }

    async fn container_status(&self, monitor: &Monitor) -> RegistryResult<ContainerStatus> {
        let results = self
            .query(&format!(
                "SELECT ?status FROM <{}> WHERE {{ \
                 ?uri docker:id \"{}\"; docker:state/docker:status ?status }}",
                self.graph, monitor.id
            ))
            .await?;

        Ok(Self::bindings(&results)
            .find_map(|b| Self::binding_str(b, "status"))
            .map(|s| ContainerStatus::from(s.as_str()))
            .unwrap_or(ContainerStatus::None))
    }

    async fn eligible_containers(&self) -> RegistryResult<Vec<Container>> {
        let results = self
            .query(&format!(
                "SELECT ?uri ?id ?name ?image FROM <{}> WHERE {{ \
                 ?uri a docker:Container; docker:id ?id; docker:name ?name; docker:image ?image; \
                 docker:state/docker:status \"running\". {} \
                 FILTER NOT EXISTS {{ ?uri docker:label/docker:key \"{}\" }} }}",
                self.graph, self.container_filter, MONITOR_LABEL_KEY
            ))
            .await?;

        Ok(Self::bindings(&results)
            .filter_map(|b| {
                Some(Container {
                    uri: Self::binding_str(b, "uri")?,
                    id: Self::binding_str(b, "id")?,
                    name: Self::binding_str(b, "name")?,
                    image: Self::binding_str(b, "image")?,
                    project: None,
                    status: ContainerStatus::Running,
                })
            })
            .collect())
    }

    async fn label_value(&self, container_id: &str, key: &str) -> RegistryResult<Option<String>> {
        let results = self
            .query(&format!(
                "SELECT ?v FROM <{}> WHERE {{ \
                 ?uri docker:id \"{}\"; docker:label ?l. ?l docker:key \"{}\"; docker:value ?v. }}",
                self.graph, container_id, key
            ))
            .await?;

        Ok(Self::bindings(&results).find_map(|b| Self::binding_str(b, "v")))
    }

    async fn save(&self, monitor: &mut Monitor) -> RegistryResult<()> {
        let insert = format!(
            "INSERT DATA {{ GRAPH <{}> {{ <{}> a logger:NetworkMonitor; \
             mu:uuid \"{}\"; logger:status \"{}\"; logger:monitors <{}>. }} }}",
            self.graph, monitor.uri, monitor.id, monitor.status, monitor.docker_container
        );

        if monitor.persisted {
            let delete = format!(
                "DELETE WHERE {{ GRAPH <{}> {{ <{}> ?p ?o }} }}",
                self.graph, monitor.uri
            );
            self.update(&delete).await?;
        }

        self.update(&insert).await?;
        monitor.persisted = true;
        Ok(())
    }

    async fn remove(&self, monitor: &Monitor) -> RegistryResult<()> {
        let delete = format!(
            "DELETE WHERE {{ GRAPH <{}> {{ <{}> ?p ?o }} }}",
            self.graph, monitor.uri
        );
        // deleting zero triples is a valid outcome; the update request
        // itself succeeding is all that's checked.
        self.update(&delete).await
    }

    async fn is_ready(&self) -> bool {
        match self
            .query(&format!("ASK FROM <{}> {{ ?s ?p ?o }}", self.graph))
            .await
        {
            Ok(v) => v.get("boolean").and_then(|b| b.as_bool()).unwrap_or(false),
            Err(e) => {
                warn!("registry not ready: {}", e);
                false
            }
        }
    }
}
