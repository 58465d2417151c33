//! Report server management: spawning, readiness probing and teardown

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ExportError, ExportResult};

/// Handle to a running report server.
///
/// The server is started in its own process group so that shutdown also
/// reaches the JVM and web server it forks.
pub struct ReportServer {
    child: Option<Child>,
    program: String,
    base_url: String,
}

impl ReportServer {
    /// Spawn the report server for `results_dir`
    pub fn spawn(config: &ServerConfig, results_dir: &Path) -> ExportResult<Self> {
        let args = config.command_args(results_dir);
        info!("Starting report server: {} {}", config.program, args.join(" "));

        let mut cmd = Command::new(&config.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| {
            ExportError::ServerStartup(format!("Failed to spawn {}: {}", config.program, e))
        })?;

        debug!("Report server pid {}", child.id());

        Ok(Self {
            child: Some(child),
            program: config.program.clone(),
            base_url: config.base_url(),
        })
    }

    /// Process id, while the server has not been shut down
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the report URL until it answers or `budget` runs out.
    ///
    /// Any HTTP response counts. Returns `false` when the budget elapsed
    /// without an answer; the caller goes ahead anyway. Fails only when the
    /// server process exits during warm-up.
    pub async fn wait_until_listening(
        &mut self,
        budget: Duration,
        interval: Duration,
    ) -> ExportResult<bool> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| ExportError::ServerStartup(e.to_string()))?;

        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            self.ensure_running()?;

            attempts += 1;
            match client.get(&self.base_url).send().await {
                Ok(resp) => {
                    info!(
                        "Report server answered {} after {:?} ({} probes)",
                        resp.status(),
                        start.elapsed(),
                        attempts
                    );
                    return Ok(true);
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for report server at {}...", self.base_url);
                    }
                    // Connection refused is expected while the server starts
                    if !e.is_connect() {
                        debug!("Readiness probe error: {}", e);
                    }
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= budget {
                warn!(
                    "Report server did not answer within {:?}; continuing",
                    budget
                );
                return Ok(false);
            }
            sleep(interval.min(budget - elapsed)).await;
        }
    }

    fn ensure_running(&mut self) -> ExportResult<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(ExportError::ServerStartup(
                "report server already shut down".to_string(),
            ));
        };
        match child.try_wait()? {
            Some(status) => Err(ExportError::ServerStartup(format!(
                "{} exited during warm-up ({})",
                self.program, status
            ))),
            None => Ok(()),
        }
    }

    /// Stop the server: SIGTERM to the process group, then SIGKILL once
    /// `grace` has passed. The child is always reaped. Never fails.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();

        match child.try_wait() {
            Ok(Some(status)) => {
                info!("Report server (pid: {}) already exited: {}", pid, status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not query report server state: {}", e),
        }

        info!("Stopping report server (pid: {})", pid);

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            if signal_group(pid, Signal::SIGTERM) {
                let deadline = Instant::now() + grace;
                while Instant::now() < deadline {
                    if let Ok(Some(_)) = child.try_wait() {
                        debug!("Report server exited after SIGTERM");
                        return;
                    }
                    sleep(Duration::from_millis(50)).await;
                }
                warn!("Report server ignored SIGTERM for {:?}; killing", grace);
            }
            signal_group(pid, Signal::SIGKILL);
        }

        #[cfg(not(unix))]
        let _ = grace;

        let _ = child.kill();
        if let Err(e) = child.wait() {
            warn!("Failed to reap report server: {}", e);
        }
    }
}

impl Drop for ReportServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Report server dropped without shutdown; killing pid {}", child.id());

            #[cfg(unix)]
            signal_group(child.id(), nix::sys::signal::Signal::SIGKILL);

            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Signal the whole process group led by `pid`, falling back to the
/// process itself when the group is gone.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    match killpg(pid, signal) {
        Ok(()) => true,
        Err(e) => {
            debug!("killpg({}, {:?}) failed: {}", pid, signal, e);
            kill(pid, signal).is_ok()
        }
    }
}
