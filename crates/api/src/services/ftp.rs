//! Minimal FTP client for report uploads.
//!
//! Plain FTP with passive-mode binary `STOR`. The data connection goes to
//! the configured host, not the address in the `227` reply, so servers
//! behind NAT work. SFTP targets are rejected.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use domain::models::{FtpProtocol, FtpTarget};
use domain::services::FtpClient;
use domain::DeliveryError;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTP session timed out after {0:?}")]
    Timeout(Duration),

    #[error("{command} failed with {code}: {message}")]
    Unexpected {
        command: String,
        code: u16,
        message: String,
    },

    #[error("Malformed server reply: {0}")]
    MalformedReply(String),

    #[error("Protocol not supported: {0}")]
    Unsupported(&'static str),
}

impl From<FtpError> for DeliveryError {
    fn from(err: FtpError) -> Self {
        DeliveryError::Ftp(err.to_string())
    }
}

/// Port announced in a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub fn parse_pasv_port(reply: &str) -> Result<u16, FtpError> {
    let malformed = || FtpError::MalformedReply(reply.to_string());
    let start = reply.find('(').ok_or_else(malformed)?;
    let end = reply[start..].find(')').ok_or_else(malformed)? + start;
    let numbers: Vec<u16> = reply[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u16>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;
    if numbers.len() != 6 || numbers.iter().any(|n| *n > 255) {
        return Err(malformed());
    }
    Ok(numbers[4] * 256 + numbers[5])
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    host: String,
}

impl Session {
    async fn connect(target: &FtpTarget) -> Result<Self, FtpError> {
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        let (read, writer) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(read),
            writer,
            host: target.host.clone(),
        };
        session.expect("connect", &[220]).await?;
        Ok(session)
    }

    /// Read one (possibly multi-line) reply.
    async fn reply(&mut self) -> Result<(u16, String), FtpError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(FtpError::MalformedReply("connection closed".to_string()));
        }
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| FtpError::MalformedReply(line.trim_end().to_string()))?;

        let mut text = line.trim_end().to_string();
        if line.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{} ", code);
            loop {
                let mut next = String::new();
                if self.reader.read_line(&mut next).await? == 0 {
                    return Err(FtpError::MalformedReply(text));
                }
                text.push('\n');
                text.push_str(next.trim_end());
                if next.starts_with(&terminator) {
                    break;
                }
            }
        }
        Ok((code, text))
    }

    async fn expect(&mut self, command: &str, accepted: &[u16]) -> Result<String, FtpError> {
        let (code, message) = self.reply().await?;
        if accepted.contains(&code) {
            Ok(message)
        } else {
            Err(FtpError::Unexpected {
                command: command.to_string(),
                code,
                message,
            })
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), FtpError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    async fn command(&mut self, line: &str, accepted: &[u16]) -> Result<String, FtpError> {
        let verb = line.split_whitespace().next().unwrap_or(line).to_string();
        self.send(line).await?;
        self.expect(&verb, accepted).await
    }

    async fn login(&mut self, target: &FtpTarget) -> Result<(), FtpError> {
        let user = self.command(&format!("USER {}", target.username), &[230, 331]).await?;
        if !user.starts_with("230") {
            self.command(&format!("PASS {}", target.password), &[230, 202])
                .await?;
        }
        Ok(())
    }

    async fn store(&mut self, local_path: &Path, remote_name: &str) -> Result<u64, FtpError> {
        self.command("TYPE I", &[200]).await?;
        let pasv = self.command("PASV", &[227]).await?;
        let port = parse_pasv_port(&pasv)?;
        let mut data = TcpStream::connect((self.host.as_str(), port)).await?;

        self.command(&format!("STOR {}", remote_name), &[125, 150])
            .await?;
        let mut file = tokio::fs::File::open(local_path).await?;
        let written = tokio::io::copy(&mut file, &mut data).await?;
        data.shutdown().await?;
        drop(data);

        self.expect("STOR", &[226, 250]).await?;
        Ok(written)
    }

    async fn quit(mut self) {
        // The upload already succeeded; a rude server is not an error.
        let _ = self.command("QUIT", &[221]).await;
    }
}

/// Uploads artifacts to customer FTP servers.
pub struct TokioFtpClient {
    timeout: Duration,
}

impl TokioFtpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn upload(
        &self,
        target: &FtpTarget,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<u64, FtpError> {
        if target.protocol == FtpProtocol::Sftp {
            return Err(FtpError::Unsupported("sftp"));
        }
        let mut session = Session::connect(target).await?;
        session.login(target).await?;
        let directory = target.directory.trim();
        if !directory.is_empty() {
            session.command(&format!("CWD {}", directory), &[250]).await?;
        }
        let written = session.store(local_path, remote_name).await?;
        session.quit().await;
        Ok(written)
    }
}

impl Default for TokioFtpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl FtpClient for TokioFtpClient {
    async fn push(
        &self,
        target: &FtpTarget,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), DeliveryError> {
        let written = tokio::time::timeout(self.timeout, self.upload(target, local_path, remote_name))
            .await
            .map_err(|_| FtpError::Timeout(self.timeout))??;
        info!(host = %target.host, remote_name, bytes = written, "FTP upload complete");
        Ok(())
    }

    async fn ping(&self, target: &FtpTarget) -> Result<(), DeliveryError> {
        if target.protocol == FtpProtocol::Sftp {
            return Err(FtpError::Unsupported("sftp").into());
        }
        let session = tokio::time::timeout(self.timeout, async {
            let mut session = Session::connect(target).await?;
            session.login(target).await?;
            Ok::<_, FtpError>(session)
        })
        .await
        .map_err(|_| FtpError::Timeout(self.timeout))??;
        session.quit().await;
        debug!(host = %target.host, "FTP login succeeded");
        Ok(())
    }
}
