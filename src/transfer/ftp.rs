//! FTP/FTPS backend.
//!
//! Uses blocking `suppaftp` sessions on the blocking thread pool, one
//! fresh connection per operation. Connections never outlive an
//! operation, so a retry after a server abort always starts from a
//! clean control channel.

use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, NativeTlsConnector, NativeTlsFtpStream, Status};
use tracing::{debug, warn};

use crate::config::{FtpSecurity, RemoteConfig, TransferConfig};
use crate::models::transfer::PushReceipt;
use crate::transfer::RemoteBackend;
use crate::{AppError, Result};

/// FTP/FTPS implementation of [`RemoteBackend`].
#[derive(Clone)]
pub struct FtpBackend {
    host: String,
    port: u16,
    security: FtpSecurity,
    username: String,
    password: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

/// One logged-in control connection, plain or TLS.
enum FtpConn {
    Plain(FtpStream),
    Secure(NativeTlsFtpStream),
}

impl FtpBackend {
    /// Build a backend from remote and transfer settings.
    #[must_use]
    pub fn new(remote: &RemoteConfig, transfer: &TransferConfig) -> Self {
        Self {
            host: remote.host.clone(),
            port: remote.port,
            security: remote.security,
            username: remote.username.clone(),
            password: remote.password.clone(),
            connect_timeout: Duration::from_secs(transfer.connect_timeout_seconds),
            io_timeout: Duration::from_secs(transfer.io_timeout_seconds),
        }
    }

    /// Open a connection, negotiate TLS when configured, and log in.
    fn connect(&self) -> Result<FtpConn> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| AppError::Transfer(format!("cannot resolve {}: {err}", self.host)))?
            .next()
            .ok_or_else(|| {
                AppError::Transfer(format!("no address found for {}", self.host))
            })?;

        let mut conn = match self.security {
            FtpSecurity::Plain => {
                let stream = FtpStream::connect_timeout(addr, self.connect_timeout)
                    .map_err(map_ftp_err)?;
                set_socket_timeouts(stream.get_ref(), self.io_timeout)?;
                FtpConn::Plain(stream)
            }
            FtpSecurity::Explicit => {
                let stream = NativeTlsFtpStream::connect_timeout(addr, self.connect_timeout)
                    .map_err(map_ftp_err)?;
                set_socket_timeouts(stream.get_ref(), self.io_timeout)?;
                let connector = TlsConnector::new().map_err(|err| {
                    AppError::Transfer(format!("tls setup failed: {err}"))
                })?;
                let secured = stream
                    .into_secure(NativeTlsConnector::from(connector), &self.host)
                    .map_err(map_ftp_err)?;
                FtpConn::Secure(secured)
            }
        };

        conn.login(&self.username, &self.password)?;
        conn.binary()?;
        Ok(conn)
    }

    /// Run a blocking session function on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpConn) -> Result<T> + Send + 'static,
    {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = backend.connect()?;
            let result = op(&mut conn);
            conn.quit();
            result
        })
        .await
        .map_err(|err| AppError::Transfer(format!("ftp worker failed: {err}")))?
    }
}

impl RemoteBackend for FtpBackend {
    fn ensure_dir(
        &self,
        remote_dir: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let remote_dir = remote_dir.to_owned();
        Box::pin(async move {
            self.with_conn(move |conn| {
                // Create each level; an existing directory answers 550,
                // which mkdir reports as FileUnavailable.
                for prefix in dir_prefixes(&remote_dir) {
                    match conn.mkdir(&prefix) {
                        Ok(())
                        | Err(AppError::Transfer(_))
                        | Err(AppError::TransferAborted(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok(())
            })
            .await
        })
    }

    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote_path: &'a str,
        total_timeout: Duration,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PushReceipt>> + Send + 'a>> {
        let local = PathBuf::from(local);
        let remote_path = remote_path.to_owned();
        Box::pin(async move {
            let upload = self.with_conn(move |conn| conn.upload(&local, &remote_path));
            match tokio::time::timeout(total_timeout, upload).await {
                Ok(result) => result,
                Err(_) => Err(AppError::TransferAborted(format!(
                    "upload exceeded total timeout of {}s",
                    total_timeout.as_secs()
                ))),
            }
        })
    }

    fn fetch(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + '_>> {
        let remote_path = remote_path.to_owned();
        Box::pin(async move {
            self.with_conn(move |conn| conn.download(&remote_path)).await
        })
    }

    fn delete_file(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let remote_path = remote_path.to_owned();
        Box::pin(async move {
            self.with_conn(move |conn| conn.delete(&remote_path)).await
        })
    }

    fn remove_dir(
        &self,
        remote_dir: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let remote_dir = remote_dir.to_owned();
        Box::pin(async move {
            self.with_conn(move |conn| conn.remove_dir(&remote_dir)).await
        })
    }
}

impl FtpConn {
    fn login(&mut self, user: &str, password: &str) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.login(user, password),
            Self::Secure(stream) => stream.login(user, password),
        }
        .map_err(|err| AppError::Transfer(format!("login failed: {err}")))
    }

    fn binary(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.transfer_type(FileType::Binary),
            Self::Secure(stream) => stream.transfer_type(FileType::Binary),
        }
        .map_err(map_ftp_err)
    }

    fn mkdir(&mut self, dir: &str) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.mkdir(dir),
            Self::Secure(stream) => stream.mkdir(dir),
        }
        .map_err(map_ftp_err)
    }

    /// Stream a local file into a STOR, tracking bytes written.
    ///
    /// A 451 on the final reply after the full payload went out means
    /// the server stored the data but aborted the command; that is
    /// success with a warning, not a retryable failure.
    fn upload(&mut self, local: &Path, remote_path: &str) -> Result<PushReceipt> {
        let mut file = std::fs::File::open(local)?;
        let expected = file.metadata()?.len();

        let written = match self {
            Self::Plain(stream) => {
                let mut data = stream.put_with_stream(remote_path).map_err(map_ftp_err)?;
                let written = copy_counted(&mut file, &mut data)?;
                match stream.finalize_put_stream(data) {
                    Ok(()) => written,
                    Err(err) => return finalize_after_abort(err, written, expected),
                }
            }
            Self::Secure(stream) => {
                let mut data = stream.put_with_stream(remote_path).map_err(map_ftp_err)?;
                let written = copy_counted(&mut file, &mut data)?;
                match stream.finalize_put_stream(data) {
                    Ok(()) => written,
                    Err(err) => return finalize_after_abort(err, written, expected),
                }
            }
        };

        if written != expected {
            return Err(AppError::TransferAborted(format!(
                "wrote {written} of {expected} bytes before the stream closed"
            )));
        }

        debug!(remote = %remote_path, bytes = written, "stor complete");
        Ok(PushReceipt {
            bytes_sent: written,
            warning: None,
        })
    }

    fn download(&mut self, remote_path: &str) -> Result<Vec<u8>> {
        let buffer = match self {
            Self::Plain(stream) => stream.retr_as_buffer(remote_path),
            Self::Secure(stream) => stream.retr_as_buffer(remote_path),
        }
        .map_err(map_ftp_err)?;
        Ok(buffer.into_inner())
    }

    fn delete(&mut self, remote_path: &str) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.rm(remote_path),
            Self::Secure(stream) => stream.rm(remote_path),
        }
        .map_err(map_ftp_err)
    }

    fn remove_dir(&mut self, remote_dir: &str) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.rmdir(remote_dir),
            Self::Secure(stream) => stream.rmdir(remote_dir),
        }
        .map_err(map_ftp_err)
    }

    fn quit(&mut self) {
        let result = match self {
            Self::Plain(stream) => stream.quit(),
            Self::Secure(stream) => stream.quit(),
        };
        if let Err(err) = result {
            debug!(?err, "quit failed on connection teardown");
        }
    }
}

/// Copy `reader` into `writer`, returning the byte count.
fn copy_counted<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<u64> {
    std::io::copy(reader, writer)
        .map_err(|err| AppError::TransferAborted(format!("data stream broke: {err}")))
}

/// Decide the outcome of a failed STOR finalization.
fn finalize_after_abort(err: FtpError, written: u64, expected: u64) -> Result<PushReceipt> {
    if written == expected && is_action_aborted(&err) {
        warn!(bytes = written, "server aborted after full payload; accepting upload");
        return Ok(PushReceipt {
            bytes_sent: written,
            warning: Some(format!("server reported abort after complete upload: {err}")),
        });
    }
    Err(map_ftp_err(err))
}

fn is_action_aborted(err: &FtpError) -> bool {
    matches!(
        err,
        FtpError::UnexpectedResponse(response)
            if response.status == Status::ActionAborted
    )
}

/// Map protocol errors onto the retryable/permanent split.
fn map_ftp_err(err: FtpError) -> AppError {
    match &err {
        FtpError::UnexpectedResponse(response)
            if matches!(
                response.status,
                Status::ActionAborted | Status::TransferAborted
            ) =>
        {
            AppError::TransferAborted(format!("server aborted transfer: {err}"))
        }
        _ => AppError::Transfer(format!("ftp: {err}")),
    }
}

fn set_socket_timeouts(socket: &std::net::TcpStream, io_timeout: Duration) -> Result<()> {
    socket
        .set_read_timeout(Some(io_timeout))
        .and_then(|()| socket.set_write_timeout(Some(io_timeout)))
        .map_err(|err| AppError::Transfer(format!("cannot set socket timeouts: {err}")))
}

/// Expand `a/b/c` into `["a", "a/b", "a/b/c"]`, keeping a root slash.
fn dir_prefixes(remote_dir: &str) -> Vec<String> {
    let rooted = remote_dir.starts_with('/');
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in remote_dir.split('/').filter(|segment| !segment.is_empty()) {
        if current.is_empty() {
            if rooted {
                current.push('/');
            }
        } else {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}
