//! HTTP backend.
//!
//! Targets a `WebDAV`-style remote that accepts `PUT`/`GET`/`DELETE` on
//! file paths. Gateway errors (502/503/504) and request timeouts are
//! retryable; every other failure is permanent.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::{FtpSecurity, RemoteConfig, TransferConfig};
use crate::models::transfer::PushReceipt;
use crate::transfer::RemoteBackend;
use crate::{AppError, Result};

/// HTTP implementation of [`RemoteBackend`].
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpBackend {
    /// Build a backend from remote and transfer settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(remote: &RemoteConfig, transfer: &TransferConfig) -> Result<Self> {
        let scheme = match remote.security {
            FtpSecurity::Plain => "http",
            FtpSecurity::Explicit => "https",
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(transfer.connect_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("http client setup failed: {err}")))?;

        Ok(Self {
            client,
            base_url: format!("{scheme}://{}:{}", remote.host, remote.port),
            username: remote.username.clone(),
            password: remote.password.clone(),
        })
    }

    fn url_for(&self, remote_path: &str) -> String {
        format!("{}/{}", self.base_url, remote_path.trim_start_matches('/'))
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }
}

impl RemoteBackend for HttpBackend {
    fn ensure_dir(
        &self,
        remote_dir: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        // Paths spring into existence on PUT; nothing to create.
        debug!(remote = %remote_dir, "ensure_dir is a no-op over http");
        Box::pin(async { Ok(()) })
    }

    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote_path: &'a str,
        total_timeout: Duration,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<PushReceipt>> + Send + 'a>> {
        let local = PathBuf::from(local);
        let url = self.url_for(remote_path);
        Box::pin(async move {
            let body = tokio::fs::read(&local).await?;
            let bytes_sent = body.len() as u64;

            let response = self
                .authed(self.client.put(&url))
                .timeout(total_timeout)
                .body(body)
                .send()
                .await
                .map_err(map_request_err)?;
            check_status(response.status(), "put")?;

            Ok(PushReceipt {
                bytes_sent,
                warning: None,
            })
        })
    }

    fn fetch(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + '_>> {
        let url = self.url_for(remote_path);
        Box::pin(async move {
            let response = self
                .authed(self.client.get(&url))
                .send()
                .await
                .map_err(map_request_err)?;
            check_status(response.status(), "get")?;
            let bytes = response.bytes().await.map_err(map_request_err)?;
            Ok(bytes.to_vec())
        })
    }

    fn delete_file(
        &self,
        remote_path: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let url = self.url_for(remote_path);
        Box::pin(async move {
            let response = self
                .authed(self.client.delete(&url))
                .send()
                .await
                .map_err(map_request_err)?;
            check_status(response.status(), "delete")
        })
    }

    fn remove_dir(
        &self,
        remote_dir: &str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        let url = self.url_for(remote_dir);
        Box::pin(async move {
            let response = self
                .authed(self.client.delete(&url))
                .send()
                .await
                .map_err(map_request_err)?;
            // Some servers have no directory objects to delete.
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            check_status(response.status(), "delete")
        })
    }
}

fn check_status(status: StatusCode, verb: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{verb} answered {status}");
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Err(AppError::TransferAborted(message))
        }
        _ => Err(AppError::Transfer(message)),
    }
}

fn map_request_err(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::TransferAborted(format!("request timed out: {err}"))
    } else {
        AppError::Transfer(format!("http: {err}"))
    }
}
