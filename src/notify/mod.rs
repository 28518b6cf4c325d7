//! Finalization notifications.
//!
//! A [`Notifier`] receives the summary produced when a session is
//! finalized. The SMTP implementation delivers it by mail; deployments
//! without an SMTP relay run the no-op sink, which only logs.

use std::future::Future;
use std::pin::Pin;

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::NotifyConfig;
use crate::{AppError, Result};

/// Delivery seam for finalization summaries.
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Notify`](crate::AppError::Notify) if delivery fails.
    fn send(
        &self,
        subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sends notifications through an SMTP relay with STARTTLS.
pub struct SmtpNotifier {
    host: String,
    port: u16,
    username: Option<String>,
    password: String,
    recipient: String,
    sender: String,
}

impl SmtpNotifier {
    /// Build a notifier from settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no SMTP host is configured.
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .clone()
            .ok_or_else(|| AppError::Config("notify.smtp_host is not set".into()))?;
        Ok(Self {
            host,
            port: config.smtp_port,
            username: config.smtp_username.clone(),
            password: config.smtp_password.clone(),
            recipient: config.recipient.clone(),
            sender: config.sender.clone(),
        })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        Message::builder()
            .from(self.sender.parse().map_err(|err| {
                AppError::Notify(format!("invalid sender address: {err}"))
            })?)
            .to(self.recipient.parse().map_err(|err| {
                AppError::Notify(format!("invalid recipient address: {err}"))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|err| AppError::Notify(format!("cannot build message: {err}")))
    }
}

impl Notifier for SmtpNotifier {
    fn send(
        &self,
        subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let message = self.build_message(subject, body);
        let host = self.host.clone();
        let port = self.port;
        let credentials = self
            .username
            .clone()
            .map(|user| Credentials::new(user, self.password.clone()));

        Box::pin(async move {
            let message = message?;
            tokio::task::spawn_blocking(move || {
                let mut builder = SmtpTransport::starttls_relay(&host)
                    .map_err(|err| AppError::Notify(format!("smtp relay setup failed: {err}")))?
                    .port(port);
                if let Some(credentials) = credentials {
                    builder = builder.credentials(credentials);
                }
                let transport = builder.build();
                transport
                    .send(&message)
                    .map(|_| ())
                    .map_err(|err| AppError::Notify(format!("smtp send failed: {err}")))
            })
            .await
            .map_err(|err| AppError::Notify(format!("smtp worker failed: {err}")))?
        })
    }
}

/// Logs the notification instead of delivering it.
#[derive(Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(
        &self,
        subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        info!(%subject, body_len = body.len(), "notification sink disabled; dropping message");
        Box::pin(async { Ok(()) })
    }
}
