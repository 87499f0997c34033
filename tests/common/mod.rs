//! Shared integration-test harness for spawning a `skronk` bot as a child
//! process and exchanging NDJSON over stdio.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Default timeout for reading a single reply from the bot.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running `skronk serve` process.
///
/// The child process is killed on drop via `kill_on_drop(true)`.
#[allow(clippy::missing_panics_doc)]
pub struct SkronkProcess {
    child: Child,
    stdin: Option<tokio::process::ChildStdin>,
    reader: BufReader<tokio::process::ChildStdout>,
    next_id: u64,
}

impl SkronkProcess {
    /// Spawns `skronk serve` with the given config and extra arguments.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn(config_path: &Path, extra: &[&str]) -> Self {
        let bin = env!("CARGO_BIN_EXE_skronk");
        let mut child = Command::new(bin)
            .args([
                "serve",
                "--config",
                config_path.to_str().expect("non-UTF-8 config path"),
                "--quiet",
            ])
            .args(extra)
            .env_remove("SKRONK_LEDGER_SCOPE")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn skronk");

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");

        Self {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
            next_id: 1,
        }
    }

    /// Writes one raw line to the bot's stdin.
    #[allow(clippy::missing_panics_doc)]
    pub async fn send_line(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write to stdin");
        stdin.flush().await.expect("failed to flush stdin");
    }

    /// Sends a `/skronk` invocation and returns its id.
    pub async fn skronk(&mut self, guild: u64, user: u64, options: Value) -> String {
        let id = format!("inv-{}", self.next_id);
        self.next_id += 1;
        let invocation = json!({
            "id": id,
            "command": "skronk",
            "guild_id": guild,
            "user_id": user,
            "options": options,
        });
        self.send_line(&invocation.to_string()).await;
        id
    }

    /// Reads one NDJSON reply from stdout.
    ///
    /// Panics on EOF, I/O error, or if nothing arrives within `timeout`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn read_reply(&mut self, timeout: Duration) -> Value {
        let mut line = String::new();
        let result = tokio::time::timeout(timeout, async {
            loop {
                line.clear();
                let n = self
                    .reader
                    .read_line(&mut line)
                    .await
                    .expect("read_line I/O error");
                assert!(n > 0, "unexpected EOF from bot");
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    return serde_json::from_str::<Value>(trimmed)
                        .unwrap_or_else(|e| panic!("invalid JSON from bot: {e}\nline: {line}"));
                }
            }
        })
        .await;
        result.expect("timed out waiting for reply from bot")
    }

    /// Closes stdin and waits for the process to exit.
    #[allow(clippy::missing_panics_doc)]
    pub async fn finish(mut self, timeout: Duration) -> std::process::ExitStatus {
        drop(self.stdin.take());
        tokio::time::timeout(timeout, self.child.wait())
            .await
            .expect("bot did not exit in time")
            .expect("failed to wait for bot")
    }

    /// Runs `skronk` with `args` to completion.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_command(args: &[&str]) -> Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_skronk"))
            .args(args)
            .output()
            .expect("failed to run skronk")
    }

    /// Returns the path to a test fixture.
    #[must_use]
    pub fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}
