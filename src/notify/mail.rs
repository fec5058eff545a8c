//! SMTP notification sink

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::render::RenderedNotification;
use super::{NotificationSink, Recipient};
use crate::config::MailConfig;

pub struct MailSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl MailSink {
    pub fn from_config(config: &MailConfig) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid from address '{}': {}", config.from, e))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        builder = builder.port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl NotificationSink for MailSink {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        notice: &RenderedNotification,
    ) -> anyhow::Result<()> {
        if recipient.email.is_empty() {
            tracing::debug!("User {} has no email address, skipping mail", recipient.user_id);
            return Ok(());
        }

        let to = Mailbox::new(Some(recipient.name.clone()), recipient.email.parse()?);
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notice.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(format!("Hello {},\n\n{}\n", recipient.name, notice.message))?;

        self.mailer.send(email).await?;
        tracing::info!("Notification mail sent to: {}", recipient.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_from_address() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "localhost".to_string(),
            from: "not an address".to_string(),
            ..MailConfig::default()
        };
        assert!(MailSink::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn builds_with_valid_config() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            from: "FilDAS <noreply@example.org>".to_string(),
            use_tls: false,
            ..MailConfig::default()
        };
        let sink = MailSink::from_config(&config).unwrap();
        assert_eq!(sink.name(), "mail");
    }
}
