use std::collections::HashMap;
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{error, info, warn};

use super::{
    ContainerHandle, ContainerSpec, EngineContainer, EngineDriver, EngineError, EngineResult,
    ListFilters,
};
use crate::model::ContainerStatus;

/// `bollard`-backed [`EngineDriver`], generalized from `docker::service::DockerService`.
#[derive(Clone)]
pub struct BollardEngine {
    client: Arc<Docker>,
}

impl BollardEngine {
    pub fn connect(socket: &str) -> EngineResult<Self> {
        let client = if socket.is_empty() {
            Docker::connect_with_local_defaults()?
        } else {
            Docker::connect_with_socket(socket, 120, bollard::API_DEFAULT_VERSION)?
        };

        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn normalize_404(id: &str, e: bollard::errors::Error) -> EngineError {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => EngineError::NotFound(id.to_string()),
            other => EngineError::Docker(other),
        }
    }
}

#[async_trait::async_trait]
impl EngineDriver for BollardEngine {
    async fn list(&self, filters: Option<ListFilters>) -> EngineResult<Vec<EngineContainer>> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
        let mut all = false;
        if let Some(f) = filters {
            all = f.all;
            if let Some((k, v)) = f.label {
                filter_map.insert("label".to_string(), vec![format!("{k}={v}")]);
            }
        }

        let options = Some(ListContainersOptions {
            all,
            filters: filter_map,
            ..Default::default()
        });

        let containers = self.client.list_containers(options).await?;

        Ok(containers
            .into_iter()
            .map(|c| EngineContainer {
                id: c.id.unwrap_or_default(),
                names: c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .collect(),
                image: c.image.unwrap_or_default(),
                status: ContainerStatus::from(c.state.as_deref().unwrap_or("")),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn pull(&self, image: &str) -> EngineResult<()> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.client.create_image(options, None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        info!("pull {}: {}", image, status);
                    }
                }
                Err(e) => {
                    error!("pull {} failed: {}", image, e);
                    return Err(EngineError::Docker(e));
                }
            }
        }

        Ok(())
    }

    async fn create(&self, spec: ContainerSpec) -> EngineResult<ContainerHandle> {
        let host_config = HostConfig {
            network_mode: Some(spec.network_mode),
            cap_add: Some(spec.cap_add),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image),
            env: Some(spec.env),
            labels: Some(spec.labels),
            host_config: Some(host_config),
            open_stdin: Some(spec.open_stdin),
            attach_stdin: Some(false),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: spec.name,
            platform: None,
        });

        let response = self
            .client
            .create_container(options, config)
            .await
            .map_err(EngineError::Docker)?;

        Ok(ContainerHandle::new(response.id))
    }

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()> {
        self.client
            .start_container::<String>(&handle.id, None)
            .await
            .map_err(|e| Self::normalize_404(&handle.id, e))?;
        Ok(())
    }

    async fn stop(&self, handle: &ContainerHandle, deadline_secs: i64) -> EngineResult<()> {
        let options = Some(StopContainerOptions { t: deadline_secs });
        if let Err(e) = self.client.stop_container(&handle.id, options).await {
            warn!("stop {} failed (ignored): {}", handle.id, e);
        }
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> EngineResult<()> {
        let options = Some(RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        });

        match self.client.remove_container(&handle.id, options).await {
            Ok(()) => Ok(()),
            Err(e) => Err(Self::normalize_404(&handle.id, e)),
        }
    }

    async fn attach_network(&self, container_id: &str, network: &str) -> EngineResult<()> {
        let options = ConnectNetworkOptions {
            container: container_id,
            endpoint_config: bollard::models::EndpointSettings::default(),
        };

        match self.client.connect_network(network, options).await {
            Ok(()) => Ok(()),
            // already attached is treated as success.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 403, ..
            }) => Ok(()),
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    async fn detach_network(&self, container_id: &str, network: &str) -> EngineResult<()> {
        let options = DisconnectNetworkOptions::<&str> {
            container: container_id,
            force: true,
        };

        if let Err(e) = self.client.disconnect_network(network, options).await {
            warn!("detach_network {} from {} failed (ignored): {}", network, container_id, e);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> EngineResult<ContainerHandle> {
        // Pure lookup: wraps the id without contacting the engine.
        Ok(ContainerHandle::new(id.to_string()))
    }
}
