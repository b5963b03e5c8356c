//! Running a command on a pooled session.

use std::time::Duration;

use russh::{Channel, ChannelMsg, client};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PoolError;

/// Collected result of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the server never reported one (or the command timed out)
    pub exit_code: Option<u32>,
    /// Whether the command timed out (partial output may be available)
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Execute `command` on a session obtained from the pool and collect its output.
///
/// The session is consumed: one command per session, as the protocol allows. On
/// timeout the partial output is returned with `timed_out` set rather than an error.
pub async fn run_command(
    mut channel: Channel<client::Msg>,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, PoolError> {
    channel
        .exec(true, command)
        .await
        .map_err(|e| PoolError::Exec(e.to_string()))?;

    let mut stdout = Vec::with_capacity(4096);
    let mut stderr = Vec::with_capacity(1024);
    let mut exit_code: Option<u32> = None;

    let collected = tokio::time::timeout(timeout, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                // ext == 1 is stderr in SSH protocol
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    stderr.extend_from_slice(&data)
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => exit_code = Some(exit_status),
                Some(ChannelMsg::Eof) if exit_code.is_some() => break,
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;

    let timed_out = collected.is_err();
    if timed_out {
        warn!(
            "Command timed out after {:?}, returning partial output ({} bytes stdout, {} bytes stderr)",
            timeout,
            stdout.len(),
            stderr.len()
        );
    }

    let _ = channel.close().await;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: if timed_out { None } else { exit_code },
        timed_out,
    })
}
