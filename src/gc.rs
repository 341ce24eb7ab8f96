//! Registry garbage collection against a running registry container.
//!
//! The sequence is fixed: swap in the read-only config and restart, run
//! `registry garbage-collect`, swap the writable config back and restart.
//! Every step's output goes into the session log; a failed step does not
//! stop the ones after it unless `abort_on_step_failure` is set, and even
//! then the writable config is always restored.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::GcConfig;
use crate::daemon::{BollardDaemon, DockerDaemon};

pub const REGISTRY_NOT_FOUND: &str = "[Err] Registry not found!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcStep {
    ReadOnly,
    GarbageCollect,
    Writable,
}

impl GcStep {
    fn tag(self) -> &'static str {
        match self {
            GcStep::ReadOnly => "R",
            GcStep::GarbageCollect => "GC",
            GcStep::Writable => "W",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: GcStep,
    pub ok: bool,
}

/// Everything one GC run produced.
#[derive(Debug, Default)]
pub struct GcReport {
    pub host: String,
    pub container: Option<String>,
    pub messages: Vec<String>,
    pub steps: Vec<StepOutcome>,
    pub failed_restarts: usize,
}

impl GcReport {
    fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.container.is_some()
            && self.failed_restarts == 0
            && !self.steps.is_empty()
            && self.steps.iter().all(|s| s.ok)
    }
}

pub struct GcOrchestrator<'a, D> {
    daemon: &'a D,
    config: &'a GcConfig,
}

impl<'a, D: DockerDaemon> GcOrchestrator<'a, D> {
    pub fn new(daemon: &'a D, config: &'a GcConfig) -> Self {
        Self { daemon, config }
    }

    pub async fn run(&self, host: &str) -> GcReport {
        let mut report = GcReport::new(host);

        let container = match self
            .daemon
            .find_container_by_label(&self.config.container_label)
            .await
        {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!(host, label = %self.config.container_label, "no registry container");
                report.messages.push(REGISTRY_NOT_FOUND.to_string());
                return report;
            }
            Err(e) => {
                error!(host, error = %e, "container lookup failed");
                report.messages.push(REGISTRY_NOT_FOUND.to_string());
                report.messages.push(format!("[Err] {}", e));
                return report;
            }
        };
        info!(host, container = %container, "starting garbage collection");
        report.container = Some(container.clone());

        let cfg = self.config;

        let read_only = self
            .exec_step(
                &mut report,
                &container,
                GcStep::ReadOnly,
                &cfg.copy_command(&cfg.read_only_config, &cfg.live_config),
            )
            .await;
        self.restart(&mut report, &container).await;
        self.wait_until_ready(&container).await;

        if !read_only && cfg.abort_on_step_failure {
            warn!(host, container = %container, "read-only step failed, skipping GC");
            report
                .messages
                .push("[EXEC][GC] skipped: read-only config not applied".to_string());
            report.steps.push(StepOutcome {
                step: GcStep::GarbageCollect,
                ok: false,
            });
        } else {
            self.exec_step(
                &mut report,
                &container,
                GcStep::GarbageCollect,
                &cfg.garbage_collect_command(),
            )
            .await;
            sleep(cfg.settle_delay()).await;
        }

        self.exec_step(
            &mut report,
            &container,
            GcStep::Writable,
            &cfg.copy_command(&cfg.writable_config, &cfg.live_config),
        )
        .await;
        self.restart(&mut report, &container).await;

        report
    }

    async fn exec_step(
        &self,
        report: &mut GcReport,
        container: &str,
        step: GcStep,
        command: &str,
    ) -> bool {
        debug!(container, command, "exec");
        let (message, ok) = match self.daemon.exec(container, command).await {
            Ok(out) => {
                let ok = out.succeeded();
                if !ok {
                    warn!(container, command, exit_code = ?out.exit_code, "exec failed");
                }
                (format!("[EXEC][{}] {}", step.tag(), out.output.trim_end()), ok)
            }
            Err(e) => {
                error!(container, command, error = %e, "exec error");
                (format!("[EXEC][{}] [Err] {}", step.tag(), e), false)
            }
        };
        report.messages.push(message);
        report.steps.push(StepOutcome { step, ok });
        ok
    }

    async fn restart(&self, report: &mut GcReport, container: &str) {
        if let Err(e) = self.daemon.restart(container).await {
            error!(container, error = %e, "restart failed");
            report.failed_restarts += 1;
        }
    }

    /// Polls with doubling delays, starting at the settle delay and capped
    /// at the readiness maximum. Gives up quietly after the last attempt.
    async fn wait_until_ready(&self, container: &str) {
        let mut delay = self.config.settle_delay();
        let attempts = self.config.readiness_attempts.max(1);

        for attempt in 1..=attempts {
            sleep(delay).await;
            match self.daemon.is_ready(container).await {
                Ok(true) => {
                    debug!(container, attempt, "container ready");
                    return;
                }
                Ok(false) => debug!(container, attempt, "container not ready yet"),
                Err(e) => warn!(container, attempt, error = %e, "readiness check failed"),
            }
            delay = next_delay(delay, self.config.readiness_max_delay());
        }

        warn!(container, attempts, "container not ready after restart, continuing");
    }
}

fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

/// Connects to the daemon behind `host_url` and runs the GC sequence.
pub async fn collect_garbage(host_url: &str, config: &GcConfig) -> GcReport {
    match BollardDaemon::connect(host_url, config) {
        Ok(daemon) => GcOrchestrator::new(&daemon, config).run(host_url).await,
        Err(e) => {
            error!(host = host_url, error = %e, "cannot connect to Docker daemon");
            let mut report = GcReport::new(host_url);
            report.messages.push(format!("[Err] {}", e));
            report
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::ExecOutput;
    use crate::error::DaemonError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDaemon {
        container: Option<String>,
        /// Commands containing one of these exit with status 1.
        failing: Vec<&'static str>,
        readiness: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDaemon {
        fn with_container(name: &str) -> Self {
            Self {
                container: Some(name.to_string()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl DockerDaemon for FakeDaemon {
        async fn find_container_by_label(
            &self,
            label: &str,
        ) -> Result<Option<String>, DaemonError> {
            self.record(format!("find {}", label));
            Ok(self.container.clone())
        }

        async fn exec(&self, container: &str, command: &str) -> Result<ExecOutput, DaemonError> {
            self.record(format!("exec {} {}", container, command));
            let failed = self.failing.iter().any(|f| command.contains(f));
            Ok(ExecOutput {
                output: format!("ran {}\n", command),
                exit_code: Some(if failed { 1 } else { 0 }),
            })
        }

        async fn restart(&self, container: &str) -> Result<(), DaemonError> {
            self.record(format!("restart {}", container));
            Ok(())
        }

        async fn is_ready(&self, container: &str) -> Result<bool, DaemonError> {
            self.record(format!("ready {}", container));
            Ok(self.readiness.lock().unwrap().pop_front().unwrap_or(true))
        }
    }

    fn fast_config() -> GcConfig {
        GcConfig {
            settle_delay_ms: 0,
            readiness_max_delay_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_container_stops_immediately() {
        let daemon = FakeDaemon::default();
        let config = fast_config();
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(report.messages, vec![REGISTRY_NOT_FOUND.to_string()]);
        assert_eq!(daemon.calls(), vec!["find registry".to_string()]);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_happy_path_sequence() {
        let daemon = FakeDaemon::with_container("registry");
        let config = fast_config();
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(
            report.messages,
            vec![
                "[EXEC][R] ran cp /etc/docker/registry/rcfg.yml /etc/docker/registry/config.yml",
                "[EXEC][GC] ran /bin/registry garbage-collect /etc/docker/registry/config.yml",
                "[EXEC][W] ran cp /etc/docker/registry/wcfg.yml /etc/docker/registry/config.yml",
            ]
        );
        assert_eq!(daemon.count("restart"), 2);
        assert_eq!(
            daemon.calls(),
            vec![
                "find registry",
                "exec registry cp /etc/docker/registry/rcfg.yml /etc/docker/registry/config.yml",
                "restart registry",
                "ready registry",
                "exec registry /bin/registry garbage-collect /etc/docker/registry/config.yml",
                "exec registry cp /etc/docker/registry/wcfg.yml /etc/docker/registry/config.yml",
                "restart registry",
            ]
        );
        assert!(report.succeeded());
        assert_eq!(report.container.as_deref(), Some("registry"));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_sequence() {
        let daemon = FakeDaemon {
            failing: vec!["rcfg.yml"],
            ..FakeDaemon::with_container("registry")
        };
        let config = fast_config();
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(report.messages.len(), 3);
        assert_eq!(daemon.count("exec"), 3);
        assert!(!report.steps[0].ok);
        assert!(report.steps[1].ok && report.steps[2].ok);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_abort_on_failure_skips_gc_but_restores() {
        let daemon = FakeDaemon {
            failing: vec!["rcfg.yml"],
            ..FakeDaemon::with_container("registry")
        };
        let config = GcConfig {
            abort_on_step_failure: true,
            ..fast_config()
        };
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(daemon.count("exec registry /bin/registry"), 0);
        assert_eq!(daemon.count("exec"), 2);
        assert_eq!(daemon.count("restart"), 2);
        assert!(report.messages[1].starts_with("[EXEC][GC] skipped"));
        assert!(report.messages[2].starts_with("[EXEC][W]"));
    }

    #[tokio::test]
    async fn test_waits_for_readiness_after_restart() {
        let daemon = FakeDaemon {
            readiness: Mutex::new(VecDeque::from(vec![false, false, true])),
            ..FakeDaemon::with_container("registry")
        };
        let config = fast_config();
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(daemon.count("ready"), 3);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_readiness_gives_up_after_attempts() {
        let daemon = FakeDaemon {
            readiness: Mutex::new(VecDeque::from(vec![false; 10])),
            ..FakeDaemon::with_container("registry")
        };
        let config = GcConfig {
            readiness_attempts: 3,
            ..fast_config()
        };
        let report = GcOrchestrator::new(&daemon, &config)
            .run("https://reg.example.com")
            .await;

        assert_eq!(daemon.count("ready"), 3);
        assert_eq!(report.messages.len(), 3);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let cap = Duration::from_millis(4000);
        assert_eq!(next_delay(Duration::from_millis(500), cap), Duration::from_millis(1000));
        assert_eq!(next_delay(Duration::from_millis(3000), cap), cap);
        assert_eq!(next_delay(Duration::MAX, cap), cap);
        assert_eq!(next_delay(Duration::MAX, Duration::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let report = collect_garbage("not-a-url", &fast_config()).await;
        assert!(report.container.is_none());
        assert_eq!(report.messages.len(), 1);
        assert!(report.messages[0].starts_with("[Err]"));
    }
}
