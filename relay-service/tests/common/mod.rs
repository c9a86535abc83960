use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;

/// Get an available ephemeral port on localhost.
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Poll /healthz until the server responds OK or timeout.
pub async fn wait_ready(base: &str, timeout_ms: u64) -> anyhow::Result<()> {
    let client = Client::new();
    let mut waited = 0u64;
    loop {
        if waited >= timeout_ms {
            anyhow::bail!("server not ready after {}ms", timeout_ms);
        }
        if let Ok(resp) = client.get(format!("{}/healthz", base)).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(50)).await;
        waited += 50;
    }
}

// Struct that ensures the child process is killed on drop
pub struct ChildGuard(std::process::Child);
impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

pub async fn setup_server() -> anyhow::Result<(String, ChildGuard)> {
    let bin = env!("CARGO_BIN_EXE_relay-service");

    let port = find_free_port();
    let base_url = format!("http://127.0.0.1:{}", port);

    let child = Command::new(bin)
        .env("PORT", port.to_string())
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Ensure we always try to kill the child on exit
    let guard = ChildGuard(child);

    // Wait until server is ready
    wait_ready(&base_url, 10_000).await?;

    Ok((base_url, guard))
}
