//! Access to the Docker daemon that runs a registry container.

use std::collections::HashMap;

use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HealthStatusEnum;
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, RestartContainerOptions,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::GcConfig;
use crate::error::DaemonError;

const DAEMON_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub output: String,
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// An unknown exit code counts as success; the output is still logged.
    pub fn succeeded(&self) -> bool {
        self.exit_code.map_or(true, |code| code == 0)
    }
}

/// The daemon operations the GC sequence needs.
#[allow(async_fn_in_trait)]
pub trait DockerDaemon {
    /// Name (without the leading `/`) of the first container carrying `label`.
    async fn find_container_by_label(&self, label: &str) -> Result<Option<String>, DaemonError>;

    async fn exec(&self, container: &str, command: &str) -> Result<ExecOutput, DaemonError>;

    async fn restart(&self, container: &str) -> Result<(), DaemonError>;

    /// Running, and not reporting a starting or unhealthy health check.
    async fn is_ready(&self, container: &str) -> Result<bool, DaemonError>;
}

/// Management endpoint for the daemon on the registry's host: same scheme,
/// same hostname, daemon port. Returns the endpoint and the hostname.
pub fn daemon_endpoint(host_url: &str, port: u16) -> Result<(String, String), DaemonError> {
    let parsed = Url::parse(host_url).map_err(|_| DaemonError::Endpoint(host_url.to_string()))?;
    let hostname = parsed
        .host_str()
        .ok_or_else(|| DaemonError::Endpoint(host_url.to_string()))?;
    Ok((
        format!("{}://{}:{}", parsed.scheme(), hostname, port),
        hostname.to_string(),
    ))
}

pub struct BollardDaemon {
    docker: Docker,
}

impl BollardDaemon {
    /// https hosts use mutual TLS with `cert.pem`, `key.pem` and `ca.pem`
    /// from the cert directory configured for that hostname.
    pub fn connect(host_url: &str, config: &GcConfig) -> Result<Self, DaemonError> {
        let (endpoint, hostname) = daemon_endpoint(host_url, config.daemon_port)?;

        let docker = if endpoint.starts_with("https://") {
            let dir = config.cert_dir_for(&hostname);
            debug!(endpoint = %endpoint, cert_dir = %dir.display(), "connecting to daemon over TLS");
            Docker::connect_with_ssl(
                &endpoint,
                &dir.join("key.pem"),
                &dir.join("cert.pem"),
                &dir.join("ca.pem"),
                DAEMON_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?
        } else {
            warn!(endpoint = %endpoint, "connecting to daemon without TLS");
            Docker::connect_with_http(&endpoint, DAEMON_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        };

        Ok(Self { docker })
    }
}

impl DockerDaemon for BollardDaemon {
    async fn find_container_by_label(&self, label: &str) -> Result<Option<String>, DaemonError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);
        let options = ListContainersOptions {
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .find_map(|c| c.names.and_then(|names| names.into_iter().next()))
            .map(|name| name.trim_start_matches('/').to_string()))
    }

    async fn exec(&self, container: &str, command: &str) -> Result<ExecOutput, DaemonError> {
        let cmd: Vec<String> = command.split_whitespace().map(String::from).collect();
        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = String::new();
        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output: mut stream, .. } => {
                while let Some(chunk) = stream.next().await {
                    output.push_str(&chunk?.to_string());
                }
            }
            StartExecResults::Detached => return Err(DaemonError::Detached(command.to_string())),
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(ExecOutput {
            output,
            exit_code: inspect.exit_code,
        })
    }

    async fn restart(&self, container: &str) -> Result<(), DaemonError> {
        self.docker
            .restart_container(container, None::<RestartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn is_ready(&self, container: &str) -> Result<bool, DaemonError> {
        let info = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await?;

        let Some(state) = info.state else {
            return Ok(false);
        };
        let health = state.health.and_then(|h| h.status);
        Ok(state.running == Some(true)
            && !matches!(
                health,
                Some(HealthStatusEnum::STARTING) | Some(HealthStatusEnum::UNHEALTHY)
            ))
    }
}
