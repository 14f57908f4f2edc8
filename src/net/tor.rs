use std::{process::Stdio, time::Duration};

use anyhow::{bail, Context, Result};
use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, Command},
    time::{sleep, timeout},
};

use crate::{
    config::TorConfig,
    net::fetcher::{DocumentFetcher, HttpFetcher},
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
const CHECK_URL: &str = "https://check.torproject.org/api/ip";

pub trait TransportController: Send + Sync {
    fn is_reachable(&self) -> BoxFuture<'_, bool>;
    fn ensure_started(&self) -> BoxFuture<'_, bool>;
    /// Best effort. A `true` return means the request was accepted and the settle delay
    /// has elapsed, not that the next request is guaranteed a fresh path.
    fn rotate_identity(&self) -> BoxFuture<'_, bool>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub reachable: bool,
    pub socks_port: u16,
    pub control_port: u16,
    pub controller_ok: bool,
    pub launched_by_us: bool,
    pub is_tor: Option<bool>,
    pub exit_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TorCheck {
    #[serde(rename = "IsTor")]
    is_tor: bool,
    #[serde(rename = "IP")]
    ip: Option<String>,
}

pub struct TorTransport {
    config: TorConfig,
    process: Mutex<Option<Child>>,
}

impl TorTransport {
    pub fn new(config: TorConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
        }
    }

    async fn probe_socks(&self) -> bool {
        let addr = (self.config.socks_host.as_str(), self.config.socks_port);
        matches!(
            timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    async fn launch(&self) -> bool {
        let Some(binary) = self.config.binary.clone() else {
            tracing::warn!(
                target: "tor",
                port = self.config.socks_port,
                "SOCKS port unreachable and TOR_BINARY not configured"
            );
            return false;
        };

        let spawned = Command::new(&binary)
            .arg("--SocksPort")
            .arg(self.config.socks_port.to_string())
            .arg("--ControlPort")
            .arg(self.config.control_port.to_string())
            .arg("--CookieAuthentication")
            .arg("0")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::info!(target: "tor", binary = %binary, pid = child.id(), "launched tor");
                *self.process.lock() = Some(child);
            }
            Err(err) => {
                tracing::error!(target: "tor", binary = %binary, error = %err, "failed to launch tor");
                return false;
            }
        }

        let deadline = tokio::time::Instant::now() + LAUNCH_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.probe_socks().await {
                tracing::info!(target: "tor", port = self.config.socks_port, "tor is accepting connections");
                return true;
            }
            sleep(Duration::from_secs(1)).await;
        }
        tracing::error!(target: "tor", "tor did not open its SOCKS port within {:?}", LAUNCH_TIMEOUT);
        false
    }

    async fn control_command(&self, command: &str) -> Result<String> {
        let addr = (self.config.socks_host.as_str(), self.config.control_port);
        let stream = timeout(PROBE_TIMEOUT, TcpStream::connect(addr))
            .await
            .context("control port connect timed out")?
            .context("control port connect failed")?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let auth = match &self.config.control_password {
            Some(password) => format!("AUTHENTICATE \"{}\"\r\n", escape_quoted(password)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        write_half.write_all(auth.as_bytes()).await?;
        let reply = read_reply(&mut reader).await?;
        if !reply.starts_with("250") {
            bail!("control port authentication rejected: {reply}");
        }

        write_half
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        let reply = read_reply(&mut reader).await?;
        let _ = write_half.write_all(b"QUIT\r\n").await;
        if !reply.starts_with("250") {
            bail!("control command {command:?} rejected: {reply}");
        }
        Ok(reply)
    }

    pub async fn status(&self) -> TransportStatus {
        let reachable = self.probe_socks().await;
        let controller_ok = self.control_command("GETINFO version").await.is_ok();
        let launched_by_us = self.process.lock().is_some();
        let mut status = TransportStatus {
            reachable,
            socks_port: self.config.socks_port,
            control_port: self.config.control_port,
            controller_ok,
            launched_by_us,
            is_tor: None,
            exit_ip: None,
        };
        if reachable {
            if let Some(check) = self.check_connection().await {
                status.is_tor = Some(check.is_tor);
                status.exit_ip = check.ip;
            }
        }
        status
    }

    async fn check_connection(&self) -> Option<TorCheck> {
        let fetcher = HttpFetcher::tor(&self.config).ok()?;
        let result = fetcher.fetch(CHECK_URL, Duration::from_secs(10)).await;
        if !result.is_success() {
            return None;
        }
        serde_json::from_str(&result.body).ok()
    }

    pub async fn shutdown(&self) {
        let child = self.process.lock().take();
        if let Some(mut child) = child {
            if let Err(err) = child.kill().await {
                tracing::warn!(target: "tor", error = %err, "failed to stop tor");
            } else {
                tracing::info!(target: "tor", "tor stopped");
            }
        }
    }
}

impl TransportController for TorTransport {
    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        self.probe_socks().boxed()
    }

    fn ensure_started(&self) -> BoxFuture<'_, bool> {
        async move {
            if self.probe_socks().await {
                return true;
            }
            self.launch().await
        }
        .boxed()
    }

    fn rotate_identity(&self) -> BoxFuture<'_, bool> {
        async move {
            match self.control_command("SIGNAL NEWNYM").await {
                Ok(_) => {
                    tracing::info!(target: "tor", settle = ?self.config.rotate_settle, "new identity requested");
                    sleep(self.config.rotate_settle).await;
                    true
                }
                Err(err) => {
                    tracing::warn!(target: "tor", error = %err, "identity rotation failed");
                    false
                }
            }
        }
        .boxed()
    }
}

async fn read_reply<R>(reader: &mut R) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = timeout(PROBE_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("control port reply timed out")??;
    if read == 0 {
        bail!("control port closed the connection");
    }
    Ok(line.trim_end().to_string())
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn escapes_password_quotes() {
        assert_eq!(escape_quoted(r#"pa"ss\word"#), r#"pa\"ss\\word"#);
    }

    async fn fake_control_port(replies: &'static [&'static str]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            for reply in replies {
                if lines.next_line().await.unwrap().is_none() {
                    return;
                }
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        port
    }

    fn transport(control_port: u16) -> TorTransport {
        TorTransport::new(TorConfig {
            socks_port: 1,
            control_port,
            rotate_settle: Duration::from_millis(10),
            ..TorConfig::default()
        })
    }

    #[tokio::test]
    async fn rotation_succeeds_on_250_replies() {
        let port = fake_control_port(&["250 OK\r\n", "250 OK\r\n"]).await;
        assert!(transport(port).rotate_identity().await);
    }

    #[tokio::test]
    async fn rotation_fails_when_authentication_is_rejected() {
        let port = fake_control_port(&["515 Authentication failed\r\n"]).await;
        assert!(!transport(port).rotate_identity().await);
    }

    #[tokio::test]
    async fn unreachable_without_binary_cannot_start() {
        let tor = transport(1);
        assert!(!tor.is_reachable().await);
        assert!(!tor.ensure_started().await);
    }
}
