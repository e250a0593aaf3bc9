// tests/common/fixtures.rs

//! Builds a standalone, file-backed server configuration for black-box tests:
//! a fresh temp directory per test, and ephemeral subscribe/admin ports
//! picked by briefly binding then releasing a `TcpListener`.

use livecfg::config::{Config, HttpConfig, StoreType};
use tempfile::TempDir;

pub struct TestConfig {
    pub config: Config,
    /// Keeps the temp directory alive for the test's duration.
    pub _dir: TempDir,
}

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("read ephemeral port")
        .port()
}

pub fn build_config(max_connection: usize, open_client_auth_token: bool) -> TestConfig {
    let dir = tempfile::tempdir().expect("create temp store directory");
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: free_port(),
        log_level: "error".to_string(),
        store_type: StoreType::JsonFile,
        config_store_directory: dir.path().to_string_lossy().to_string(),
        redis_url: None,
        mongodb_url: None,
        notify_channel: "rtc_config".to_string(),
        max_connection,
        open_client_auth_token,
        http: HttpConfig {
            enabled: true,
            port: free_port(),
        },
    };
    TestConfig { config, _dir: dir }
}
