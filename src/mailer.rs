//! Outbound email delivery.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::MailConfig;
use crate::error::{Result, TrackerError};

/// One message to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_body: String,
}

/// Email delivery collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver one message; each call succeeds or fails on its own.
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP relay sender
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// SMTP transport for `config`; STARTTLS when a login is set, plain otherwise
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config.from_address.parse()?;

        let mut builder = if config.smtp_user.is_some() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            // Local relays (mailpit, postfix on localhost) without TLS or auth
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(user), Some(password)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let to: Mailbox = mail.to.parse()?;
        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone())?)
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = self.build_message(mail)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| TrackerError::Mail(format!("{}: {e}", mail.to)))?;
        debug!(to = %mail.to, code = %response.code(), "SMTP accepted message");
        Ok(())
    }
}
