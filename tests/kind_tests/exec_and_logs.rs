//! Integration tests for commands and logs
//!
//! DevPod installs its agent by running commands in the workspace container
//! and shows the container log when something goes wrong.

use std::io::Cursor;

use tokio::io::{AsyncReadExt, AsyncWrite, DuplexStream};

use devpod_common::ComparableOptions;
use devpod_workspace::ExecIo;

use super::helpers::{
    cleanup_namespace, ensure_test_cluster, fresh_namespace, reconciler, sleeping_workspace,
};

fn capture() -> (Box<dyn AsyncWrite + Send + Unpin>, DuplexStream) {
    let (writer, reader) = tokio::io::duplex(64 * 1024);
    (Box::new(writer), reader)
}

async fn drain(mut reader: DuplexStream) -> String {
    let mut out = String::new();
    let _ = reader.read_to_string(&mut out).await;
    out
}

// =============================================================================
// Exec Stories
// =============================================================================

/// Story: DevPod pipes a script into the workspace and reads the answer
///
/// Expected behavior:
/// - stdin reaches the remote shell
/// - stdout comes back
/// - a failing command reports its exit code
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_commands_stream_through_the_workspace() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "exec").await;
    let workspace = reconciler(&client, &namespace, "exec", ComparableOptions::default());
    workspace
        .run(Some(sleeping_workspace("exec")))
        .await
        .expect("run failed");

    // Act: echo stdin back
    let (stdout, reader) = capture();
    let io = ExecIo {
        stdin: Some(Box::new(Cursor::new(b"hello from stdin\n".to_vec()))),
        stdout,
        stderr: Box::new(tokio::io::sink()),
    };
    workspace.command(None, "head -n 1", io).await.expect("exec failed");
    assert_eq!(drain(reader).await.trim(), "hello from stdin");

    // Act: a command that fails
    let io = ExecIo {
        stdin: None,
        stdout: Box::new(tokio::io::sink()),
        stderr: Box::new(tokio::io::sink()),
    };
    let err = workspace.command(None, "exit 7", io).await.unwrap_err();
    assert_eq!(err.exit_code(), 7);

    cleanup_namespace(&client, &namespace).await;
}

#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn integration_logs_show_container_output() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "logs").await;
    let workspace = reconciler(&client, &namespace, "logs", ComparableOptions::default());
    workspace
        .run(Some(sleeping_workspace("logs")))
        .await
        .expect("run failed");

    let logs = workspace.logs().await.expect("logs failed");
    assert!(logs.contains("workspace started"), "unexpected logs: {logs}");

    cleanup_namespace(&client, &namespace).await;
}
