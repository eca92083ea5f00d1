use crate::template::{email_body, email_subject};
use crate::{EmailConfig, NotificationChannel};
use anyhow::Result;
use apiwatch_common::types::Alert;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing;

pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig, recipients: Vec<String>) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
            recipients,
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        if self.recipients.is_empty() {
            tracing::debug!(alert_id = %alert.id, "No email recipients configured, skipping");
            return Ok(());
        }

        let subject = email_subject(alert);
        let body = email_body(alert);

        for recipient in &self.recipients {
            let message = Message::builder()
                .from(self.from.parse()?)
                .to(recipient.parse()?)
                .subject(&subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())?;

            self.transport.send(message).await?;
        }

        Ok(())
    }

    fn channel_type(&self) -> &str {
        "email"
    }
}
