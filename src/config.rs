//! Env-driven configuration for the reconciler.
//!
//! `CAPTURE_CONTAINER_FILTER` is spliced verbatim into the eligibility
//! query (see `registry::sparql`); it is operator-trusted configuration,
//! never user input.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "netmon-reconciler")]
pub struct Config {
    /// Image reference for the companion (monitor) container.
    #[arg(long, env = "MONITOR_IMAGE")]
    pub monitor_image: String,

    /// Milliseconds between reconciler passes.
    #[arg(long, env = "CAPTURE_SYNC_INTERVAL", default_value_t = 60_000)]
    pub capture_sync_interval_ms: u64,

    /// Registry partition (application graph) used in every query.
    #[arg(long, env = "APPLICATION_GRAPH")]
    pub application_graph: String,

    /// Opaque query fragment spliced into the eligibility query; must
    /// constrain `?uri`. Operator-trusted, not escaped.
    #[arg(long, env = "CAPTURE_CONTAINER_FILTER", default_value = "")]
    pub capture_container_filter: String,

    /// Engine-level network logged containers are attached to.
    #[arg(long, env = "LOGSTASH_NETWORK")]
    pub logstash_network: String,

    /// Container engine endpoint (e.g. `unix:///var/run/docker.sock`).
    #[arg(long, env = "CAPTURE_DOCKER_SOCKET")]
    pub capture_docker_socket: String,

    /// SPARQL endpoint URL for the registry.
    #[arg(long, env = "REGISTRY_ENDPOINT")]
    pub registry_endpoint: String,

    /// Max message size forwarded to the companion, verbatim.
    #[arg(long, env = "PACKETBEAT_MAX_MESSAGE_SIZE")]
    pub packetbeat_max_message_size: Option<String>,

    /// Listen ports forwarded to the companion, verbatim.
    #[arg(long, env = "PACKETBEAT_LISTEN_PORTS")]
    pub packetbeat_listen_ports: Option<String>,

    /// Bind host for the delta-feed HTTP surface.
    #[arg(long, env = "RECONCILER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port for the delta-feed HTTP surface.
    #[arg(long, env = "RECONCILER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// How long shutdown may take before draining is considered failed.
    #[arg(long, env = "SHUTDOWN_DEADLINE_SECS", default_value_t = 30)]
    pub shutdown_deadline_secs: u64,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_sync_interval_ms)
    }

    pub fn shutdown_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_deadline_secs)
    }
}
