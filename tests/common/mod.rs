//! Shared utilities for process handoff and drain tests.

#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use octopus::lifecycle::{send_signal, Signal};

/// A running demo server whose log output is collected line by line.
///
/// Forked generations inherit the same stdout, so their lines land here too.
pub struct ServerProcess {
    child: Child,
    logs: Arc<Mutex<Vec<String>>>,
    guard: ProcessGuard,
}

impl ServerProcess {
    /// Start the demo binary with `args`.
    pub fn spawn(args: &[&str]) -> Self {
        Self::spawn_in(&std::env::current_dir().unwrap(), args)
    }

    /// Start the demo binary with `args` from working directory `dir`.
    pub fn spawn_in(dir: &Path, args: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_octopus"))
            .args(args)
            .current_dir(dir)
            .env("RUST_LOG", "info")
            .env_remove("OCTOPUS_LISTENER")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("failed to start octopus");

        let stdout = child.stdout.take().expect("stdout is piped");
        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&logs);
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => sink.lock().unwrap().push(line),
                    Err(_) => break,
                }
            }
        });

        let mut guard = ProcessGuard::default();
        guard.watch(child.id());

        Self { child, logs, guard }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn signal(&self, signal: Signal) {
        send_signal(self.pid(), signal).expect("failed to signal server");
    }

    /// Kill `pid` when this server is dropped.
    pub fn adopt(&mut self, pid: u32) {
        self.guard.watch(pid);
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn count_logs(&self, needle: &str) -> usize {
        self.logs().iter().filter(|line| line.contains(needle)).count()
    }

    /// Wait until `count` lines contain `needle`; returns those lines.
    pub fn wait_for_logs(&self, needle: &str, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let matching: Vec<String> = self
                .logs()
                .into_iter()
                .filter(|line| line.contains(needle))
                .collect();
            if matching.len() >= count {
                return matching;
            }
            if Instant::now() > deadline {
                panic!(
                    "timed out waiting for {} x {:?}; logs so far:\n{}",
                    count,
                    needle,
                    self.logs().join("\n")
                );
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    pub fn wait_for_log(&self, needle: &str, timeout: Duration) -> String {
        self.wait_for_logs(needle, 1, timeout).remove(0)
    }

    /// Wait for the first generation to exit.
    pub fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().unwrap() {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        None
    }
}

/// Kills every watched pid on drop, so a failed test leaves no servers behind.
#[derive(Default)]
pub struct ProcessGuard {
    pids: Vec<u32>,
}

impl ProcessGuard {
    pub fn watch(&mut self, pid: u32) {
        self.pids.push(pid);
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for pid in &self.pids {
            let _ = send_signal(*pid, Signal::Other(libc::SIGKILL));
        }
    }
}

/// Extract the value of a `key=value` field from a log line.
pub fn field(line: &str, key: &str) -> Option<u32> {
    let prefix = format!("{}=", key);
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(prefix.as_str()))
        .and_then(|value| value.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// GET `/ping` and return the pid that served it.
pub async fn ping(client: &reqwest::Client, addr: &str) -> reqwest::Result<u32> {
    let response = client
        .get(format!("http://{}/ping", addr))
        .send()
        .await?
        .error_for_status()?;
    let pid = response
        .headers()
        .get("x-served-by")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    assert_eq!(response.text().await?, "pong\n");
    Ok(pid)
}

/// Poll `/ping` until the server answers.
pub async fn wait_until_serving(client: &reqwest::Client, addr: &str) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match ping(client, addr).await {
            Ok(pid) => return pid,
            Err(e) if Instant::now() > deadline => panic!("server never answered: {}", e),
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}
