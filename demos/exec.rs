#![deny(clippy::unwrap_used)]

//! Run a command twice over one pooled SSH connection.
//!
//! ```text
//! SSH_ADDRESS=127.0.0.1:22 SSH_USER=username SSH_PASSWORD=yourpassword \
//!     cargo run --example exec -- ls
//! ```
//!
//! Without `SSH_PASSWORD` or `SSH_KEY_PATH` the SSH agent is used. Pool tuning
//! variables (`SSH_POOL_TIMEOUT_MS`, `SSH_CONNECT_TIMEOUT`, ...) apply as usual,
//! and a `.env` file is honoured.

use std::env;
use std::io::Write;
use std::time::Duration;

use dotenv::dotenv;
use ssh_pool::{Credentials, DEFAULT_POOL, ssh::run_command};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let address = env::var("SSH_ADDRESS").unwrap_or_else(|_| "127.0.0.1:22".to_string());
    let username = env::var("SSH_USER").unwrap_or_else(|_| "username".to_string());
    let command = env::args().nth(1).unwrap_or_else(|| "ls".to_string());

    let mut credentials = Credentials::new(username);
    if let Ok(password) = env::var("SSH_PASSWORD") {
        credentials = credentials.with_password(password);
    }
    if let Ok(key_path) = env::var("SSH_KEY_PATH") {
        credentials = credentials.with_key(key_path);
    }

    for run in 1..=2 {
        let session = ssh_pool::open("tcp", &address, &credentials).await?;
        let output = run_command(session, &command, Duration::from_secs(30)).await?;

        std::io::stdout().write_all(output.stdout.as_bytes())?;
        std::io::stderr().write_all(output.stderr.as_bytes())?;
        info!(
            "Run {} finished with exit code {:?}; pooled connections: {}",
            run,
            output.exit_code,
            DEFAULT_POOL.len()
        );
    }

    for conn in DEFAULT_POOL.connections() {
        info!("{} {} since {} ({:?})", conn.id, conn.key, conn.dialed_at, conn.state);
    }

    Ok(())
}
