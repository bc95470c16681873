// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn completed_commands_return_their_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo hello"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn failing_spawns_surface_the_description() {
    let cmd = Command::new("definitely-not-a-real-binary");
    let err = run_with_timeout(cmd, Duration::from_secs(5), "missing binary")
        .await
        .unwrap_err();
    assert!(err.contains("missing binary"));
    assert!(err.contains("failed"));
}

#[tokio::test]
async fn slow_commands_time_out() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "sleep 5"]);
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sh sleep")
        .await
        .unwrap_err();
    assert!(err.contains("timed out"));
}

#[tokio::test]
async fn tmux_builder_sets_the_program() {
    // Only the invocation shape is checked; no tmux server is required.
    let cmd = tmux(&["has-session", "-t", "nope"]);
    assert_eq!(cmd.as_std().get_program(), "tmux");
    let args: Vec<String> = cmd
        .as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, ["has-session", "-t", "nope"]);
}
