// ABOUTME: Port detection and preview URL resolution after execution
// ABOUTME: Bounded polling with raw-evidence logging so failures are diagnosable

use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use codex_config::{env_u64_in_range, CODEX_PORT_GRACE_SECS, CODEX_PORT_WARMUP_SECS};
use codex_executions::LogWriter;

use crate::error::{Result, SandboxError};
use crate::provider::Sandbox;
use crate::types::RunOptions;

/// Dev-server ports tried first when several candidates are listening.
const PREFERRED_DEV_PORTS: [u16; 6] = [3000, 5173, 8080, 4200, 8000, 1234];

/// Timeout for the short introspection commands themselves.
const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Detection windows. Dev servers are started asynchronously by shell
/// actions and take unpredictable time to bind; one warm-up wait plus one
/// grace retry bounds that wait instead of polling forever.
#[derive(Debug, Clone)]
pub struct PortResolverConfig {
    pub warmup: Duration,
    pub grace: Duration,
}

impl Default for PortResolverConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(30),
            grace: Duration::from_secs(15),
        }
    }
}

impl PortResolverConfig {
    pub fn from_env() -> Self {
        Self {
            warmup: Duration::from_secs(env_u64_in_range(CODEX_PORT_WARMUP_SECS, 0..=300, 30)),
            grace: Duration::from_secs(env_u64_in_range(CODEX_PORT_GRACE_SECS, 0..=300, 15)),
        }
    }
}

/// A detected dev-server port and its externally reachable preview URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPreview {
    pub port: u16,
    pub url: String,
}

/// Resolves which port the dev server bound to and builds the preview URL.
pub struct PortResolver {
    config: PortResolverConfig,
}

impl PortResolver {
    pub fn new(config: PortResolverConfig) -> Self {
        Self { config }
    }

    /// Wait for the warm-up window, attempt detection, retry once after the
    /// grace window, then give up. Exhausting both windows is fatal for the
    /// run - unbounded polling would silently burn the task's time budget.
    pub async fn resolve(&self, sandbox: &dyn Sandbox, logs: &LogWriter) -> Result<ResolvedPreview> {
        tokio::time::sleep(self.config.warmup).await;

        if let Some(port) = self.detect_port(sandbox, logs).await? {
            return self.build_preview(sandbox, logs, port).await;
        }

        logs.system(format!(
            "No listening port found, retrying in {}s",
            self.config.grace.as_secs()
        ))
        .await?;
        tokio::time::sleep(self.config.grace).await;

        if let Some(port) = self.detect_port(sandbox, logs).await? {
            return self.build_preview(sandbox, logs, port).await;
        }

        Err(SandboxError::PortUndetected)
    }

    /// Inspect listening sockets, falling back to the process list. The
    /// heuristic is deliberately private and replaceable; raw evidence is
    /// persisted so a failed detection can be diagnosed from the logs alone.
    async fn detect_port(&self, sandbox: &dyn Sandbox, logs: &LogWriter) -> Result<Option<u16>> {
        for command in ["ss -tlnp", "netstat -tln"] {
            let result = sandbox
                .run_command(
                    command,
                    RunOptions {
                        timeout: INTROSPECT_TIMEOUT,
                        output: None,
                    },
                )
                .await;

            let exec = match result {
                Ok(exec) => exec,
                Err(error) => {
                    warn!("Port scan command {:?} failed: {}", command, error);
                    continue;
                }
            };
            if exec.exit_code != 0 {
                continue;
            }

            logs.system(format!("Port scan ({}):\n{}", command, exec.stdout))
                .await?;

            let candidates = listening_ports(&exec.stdout);
            logs.system(format!("Candidate ports: {:?}", candidates))
                .await?;
            if let Some(port) = pick_port(&candidates) {
                info!("Detected dev server on port {}", port);
                return Ok(Some(port));
            }
        }

        // Last resort: dev commands often carry the port on their argv
        if let Ok(exec) = sandbox
            .run_command(
                "ps aux",
                RunOptions {
                    timeout: INTROSPECT_TIMEOUT,
                    output: None,
                },
            )
            .await
        {
            logs.system(format!("Process list:\n{}", exec.stdout)).await?;
            let candidates = ports_from_commands(&exec.stdout);
            if let Some(port) = pick_port(&candidates) {
                info!("Detected dev server port {} from process list", port);
                return Ok(Some(port));
            }
        }

        Ok(None)
    }

    /// Probe liveness from inside the sandbox and assemble the preview URL.
    /// A failed probe is a warning, not a failure - the port may become
    /// healthy after the logs are captured.
    async fn build_preview(
        &self,
        sandbox: &dyn Sandbox,
        logs: &LogWriter,
        port: u16,
    ) -> Result<ResolvedPreview> {
        let probe = format!(
            "curl -s -o /dev/null -w \"%{{http_code}}\" --max-time 10 http://localhost:{}",
            port
        );
        match sandbox
            .run_command(
                &probe,
                RunOptions {
                    timeout: INTROSPECT_TIMEOUT,
                    output: None,
                },
            )
            .await
        {
            Ok(exec) => {
                let status: u16 = exec.stdout.trim().parse().unwrap_or(0);
                if (200..400).contains(&status) {
                    logs.system(format!("Liveness probe on port {} returned {}", port, status))
                        .await?;
                } else {
                    warn!("Liveness probe on port {} returned {}", port, status);
                    logs.system(format!(
                        "Warning: liveness probe on port {} returned {}",
                        port, status
                    ))
                    .await?;
                }
            }
            Err(error) => {
                warn!("Liveness probe on port {} failed: {}", port, error);
                logs.system(format!("Warning: liveness probe failed: {}", error))
                    .await?;
            }
        }

        let host = sandbox.get_host(port).await?;
        let url = format!("https://{}", host);
        logs.system(format!("Preview ready at {}", url)).await?;

        Ok(ResolvedPreview { port, url })
    }
}

/// Parse ports out of `ss`/`netstat` output: for every LISTEN line, take
/// the port suffix of each address token.
fn listening_ports(output: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for line in output.lines() {
        if !line.contains("LISTEN") {
            continue;
        }
        for token in line.split_whitespace() {
            let Some((_, suffix)) = token.rsplit_once(':') else {
                continue;
            };
            if let Ok(port) = suffix.parse::<u16>() {
                if port > 1024 && !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

/// Extract port numbers from command lines in a process listing.
fn ports_from_commands(output: &str) -> Vec<u16> {
    let patterns = [r"--port[=\s]+(\d+)", r"-p\s+(\d+)", r"PORT=(\d+)"];
    let mut ports = Vec::new();

    for pattern in &patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for captures in re.captures_iter(output) {
            if let Some(port_match) = captures.get(1) {
                if let Ok(port) = port_match.as_str().parse::<u16>() {
                    if port > 1024 && !ports.contains(&port) {
                        ports.push(port);
                    }
                }
            }
        }
    }
    ports
}

fn pick_port(candidates: &[u16]) -> Option<u16> {
    for preferred in PREFERRED_DEV_PORTS {
        if candidates.contains(&preferred) {
            return Some(preferred);
        }
    }
    candidates.first().copied()
}
