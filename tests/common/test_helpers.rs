// tests/common/test_helpers.rs

//! Spins up the full server in-process for black-box tests, plus a small
//! newline-delimited-JSON client for the subscribe channel.

use std::time::Duration;

use livecfg::config::Config;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Starts `server::run` in the background and waits for it to be ready to
/// accept connections. The task is leaked for the test process's lifetime,
/// which is fine for a short-lived test binary.
pub async fn spawn_server(config: Config) {
    tokio::spawn(async move {
        if let Err(e) = livecfg::server::run(config).await {
            eprintln!("test server exited with error: {e}");
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
}

pub struct SubscribeClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SubscribeClient {
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to subscribe channel");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    pub async fn pull(
        &mut self,
        config_name: &str,
        env: &str,
        hash_code: &str,
        context: Value,
    ) -> Value {
        let frame = json!({
            "message_type": "pull",
            "config_name": config_name,
            "env": env,
            "hash_code": hash_code,
            "context": context,
        });
        self.send(frame).await;
        self.recv().await
    }

    pub async fn send(&mut self, value: Value) {
        let mut line = serde_json::to_vec(&value).expect("serialize pull frame");
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .expect("write pull frame");
    }

    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .expect("read server frame");
        serde_json::from_str(line.trim_end()).expect("parse server frame as JSON")
    }

    /// Reads a proactively-pushed frame with a bounded wait, for assertions
    /// that a change was *not* pushed.
    pub async fn try_recv(&mut self, timeout: Duration) -> Option<Value> {
        let mut line = String::new();
        tokio::time::timeout(timeout, self.reader.read_line(&mut line))
            .await
            .ok()?
            .ok()?;
        serde_json::from_str(line.trim_end()).ok()
    }
}

pub fn admin_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}
