// ABOUTME: Integration tests for port detection and preview URL resolution
// ABOUTME: Uses zero-width windows so the bounded polling runs instantly

mod support;

use std::time::Duration;

use codex_sandbox::{PortResolver, PortResolverConfig, SandboxError};
use support::{test_harness, StubExec, StubSandbox};

fn instant_resolver() -> PortResolver {
    PortResolver::new(PortResolverConfig {
        warmup: Duration::from_millis(0),
        grace: Duration::from_millis(0),
    })
}

#[tokio::test]
async fn test_detects_listening_port_and_builds_url() {
    let (_storage, logs) = test_harness("run-port").await;
    let sandbox = StubSandbox::new("sbx-1")
        .respond(
            "ss -tlnp",
            StubExec {
                exit_code: 0,
                stdout: "LISTEN 0 511 0.0.0.0:3000 0.0.0.0:* users:((\"node\",pid=7,fd=18))\n"
                    .to_string(),
                ..Default::default()
            },
        )
        .respond(
            "curl",
            StubExec {
                exit_code: 0,
                stdout: "200".to_string(),
                ..Default::default()
            },
        );

    let preview = instant_resolver().resolve(&sandbox, &logs).await.unwrap();

    assert_eq!(preview.port, 3000);
    assert_eq!(preview.url, "https://3000-sbx-1.sandbox.codex.dev");
}

#[tokio::test]
async fn test_raw_evidence_is_persisted() {
    let (storage, logs) = test_harness("run-evidence").await;
    let sandbox = StubSandbox::new("sbx-2")
        .respond(
            "ss -tlnp",
            StubExec {
                exit_code: 0,
                stdout: "LISTEN 0 128 [::]:5173 [::]:*\n".to_string(),
                ..Default::default()
            },
        )
        .respond(
            "curl",
            StubExec {
                exit_code: 0,
                stdout: "200".to_string(),
                ..Default::default()
            },
        );

    instant_resolver().resolve(&sandbox, &logs).await.unwrap();

    let rows = storage.get_logs("run-evidence").await.unwrap();
    assert!(rows.iter().any(|l| l.content.contains("Port scan (ss -tlnp)")));
    assert!(rows.iter().any(|l| l.content.contains("Candidate ports: [5173]")));
    assert!(rows.iter().any(|l| l.content.contains("Preview ready at")));
}

#[tokio::test]
async fn test_failed_probe_is_warning_not_failure() {
    let (storage, logs) = test_harness("run-probe").await;
    let sandbox = StubSandbox::new("sbx-3")
        .respond(
            "ss -tlnp",
            StubExec {
                exit_code: 0,
                stdout: "LISTEN 0 511 0.0.0.0:3000 0.0.0.0:*\n".to_string(),
                ..Default::default()
            },
        )
        .respond(
            "curl",
            StubExec {
                exit_code: 0,
                stdout: "502".to_string(),
                ..Default::default()
            },
        );

    let preview = instant_resolver().resolve(&sandbox, &logs).await.unwrap();
    assert_eq!(preview.port, 3000);

    let rows = storage.get_logs("run-probe").await.unwrap();
    assert!(rows
        .iter()
        .any(|l| l.content.contains("Warning: liveness probe on port 3000 returned 502")));
}

#[tokio::test]
async fn test_exhausted_windows_are_fatal() {
    // Nothing listening after both windows is fatal for the run.
    let (storage, logs) = test_harness("run-noport").await;
    let sandbox = StubSandbox::new("sbx-4");

    let err = instant_resolver().resolve(&sandbox, &logs).await.unwrap_err();
    assert!(matches!(err, SandboxError::PortUndetected));

    // Both detection rounds ran: the grace retry was logged
    let rows = storage.get_logs("run-noport").await.unwrap();
    assert!(rows
        .iter()
        .any(|l| l.content.contains("No listening port found")));
}
