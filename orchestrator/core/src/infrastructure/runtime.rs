// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateBody, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::domain::runtime::{
    BridgeContainerSpec, ContainerNetwork, ContainerRuntime, KeyMaterial, RuntimeError,
};

/// Seconds Docker waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i32 = 10;

pub struct DockerBridgeRuntime {
    docker: Docker,
    image: String,
    network_mode: Option<String>,
    storage_url: Option<String>,
}

impl DockerBridgeRuntime {
    pub fn new(
        image: String,
        socket_path: Option<String>,
        network_mode: Option<String>,
        storage_url: Option<String>,
    ) -> Result<Self, RuntimeError> {
        let docker = if let Some(path) = socket_path {
            Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION).map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            image,
            network_mode,
            storage_url,
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| {
                RuntimeError::Unavailable(format!("Cannot connect to Docker daemon: {}", e))
            })?;
        Ok(())
    }

    async fn ensure_image(&self) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling image: {}", self.image);
        let options = CreateImageOptionsBuilder::default()
            .from_image(&self.image)
            .build();
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::CreateFailed(format!(
                    "Failed to pull image {}: {}",
                    self.image, e
                )));
            }
        }
        info!("Successfully pulled image: {}", self.image);
        Ok(())
    }

    fn container_body(
        &self,
        spec: &BridgeContainerSpec,
        keys: &KeyMaterial,
    ) -> ContainerCreateBody {
        let mut env = vec![
            format!("BRIDGE_ID={}", spec.bridge_id),
            format!("BRIDGE_NAME={}", spec.name),
            format!("BRIDGE_NAMESPACE={}", spec.namespace),
            format!("ACCOUNT_ID={}", spec.account_id),
            format!("STORAGE_USER={}", spec.username),
            format!("DIRECTORY_MAP={}", spec.directory_map),
            format!("SSH_KEY_ID={}", keys.key_id),
            format!("SSH_KEY={}", keys.private_key),
        ];
        if let Some(url) = &self.storage_url {
            env.push(format!("STORAGE_URL={}", url));
        }

        let labels: HashMap<String, String> = spec.labels();

        ContainerCreateBody {
            image: Some(self.image.clone()),
            env: Some(env),
            labels: Some(labels),
            attach_stdin: Some(false),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            tty: Some(false),
            host_config: Some(HostConfig {
                network_mode: self.network_mode.clone(),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Remove a leftover container of a failed earlier attempt, by name.
    async fn remove_stale(&self, name: &str) -> Result<(), RuntimeError> {
        self.remove(name).await
    }

    async fn create_one(
        &self,
        spec: &BridgeContainerSpec,
        keys: &KeyMaterial,
        index: u8,
    ) -> Result<String, RuntimeError> {
        let name = spec.container_name(index);
        self.remove_stale(&name).await?;

        let options = CreateContainerOptionsBuilder::default().name(&name).build();
        let res = self
            .docker
            .create_container(Some(options), self.container_body(spec, keys))
            .await
            .map_err(|e| RuntimeError::CreateFailed(format!("{}: {}", name, e)))?;

        debug!("Created bridge container {} ({})", name, res.id);
        Ok(res.id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            // Already running
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) => Err(RuntimeError::StartFailed(format!("{}: {}", id, e))),
        }
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::default()
            .t(STOP_TIMEOUT_SECS)
            .build();
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // Already stopped, or already gone
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(RuntimeError::StopFailed(format!("{}: {}", id, e))),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(RuntimeError::RemoveFailed(format!("{}: {}", id, e))),
        }
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

#[async_trait]
impl ContainerRuntime for DockerBridgeRuntime {
    async fn create_bridge_containers(
        &self,
        spec: &BridgeContainerSpec,
        keys: &KeyMaterial,
    ) -> Result<(String, String), RuntimeError> {
        self.ensure_image().await?;

        let container1 = self.create_one(spec, keys, 1).await?;
        let container2 = self.create_one(spec, keys, 2).await?;

        self.start(&container1).await?;
        self.start(&container2).await?;

        info!(
            "Started bridge containers for {}: {}, {}",
            spec.bridge_id, container1, container2
        );
        Ok((container1, container2))
    }

    async fn delete_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError> {
        for id in [container1_id, container2_id] {
            self.stop(id).await?;
            self.remove(id).await?;
        }
        info!("Removed bridge containers {}, {}", container1_id, container2_id);
        Ok(())
    }

    async fn stop_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError> {
        self.stop(container1_id).await?;
        self.stop(container2_id).await?;
        info!("Stopped bridge containers {}, {}", container1_id, container2_id);
        Ok(())
    }

    async fn resume_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError> {
        for id in [container1_id, container2_id] {
            self.stop(id).await?;
            self.start(id).await?;
        }
        info!("Resumed bridge containers {}, {}", container1_id, container2_id);
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerNetwork, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => RuntimeError::ContainerNotFound(container_id.to_string()),
                _ => RuntimeError::Unavailable(e.to_string()),
            })?;

        let address = inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .and_then(|networks| {
                let mut names: Vec<&String> = networks.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .filter_map(|name| networks.get(name))
                    .filter_map(|endpoint| endpoint.ip_address.clone())
                    .find(|ip| !ip.is_empty())
            });

        Ok(ContainerNetwork { address })
    }
}
