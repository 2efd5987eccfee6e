//! SMTP notifier backed by Lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Decision, Notifier, NotifyError};
use crate::db::Registration;

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host, e.g. "smtp.gmail.com".
    pub host: String,

    /// Relay port (465 for implicit TLS).
    pub port: u16,

    /// Authentication username.
    pub username: String,

    /// Authentication password (an app-specific password for Gmail).
    pub password: String,

    /// Sender mailbox, e.g. "MARMA Registry <no-reply@marma.org>".
    pub from: String,
}

/// Sends registration emails through an SMTP relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    /// Build a notifier from relay settings.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Transport` if the relay configuration is
    /// invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    async fn send_html(
        &self,
        to: &str,
        subject: &str,
        html_body: String,
    ) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::Address(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError::Address(format!("invalid recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn registration_received(&self, registration: &Registration) -> Result<(), NotifyError> {
        let html_body = format!(
            r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="color: #003366;">Mano River Ministerial Alliance</h2>
  <p>Dear {full_name},</p>
  <p>Thank you for registering with the Mano River Ministerial Alliance.
     Your registration has been received and is currently under review by
     our administrative team.</p>
  <div style="background-color: #f5f5f5; padding: 15px; border-radius: 5px;">
    <h3 style="color: #003366; margin-top: 0;">Registration Details</h3>
    <p><strong>Name:</strong> {full_name}</p>
    <p><strong>Email:</strong> {email}</p>
    <p><strong>Country:</strong> {country}</p>
    <p><strong>Regional Code:</strong> {regional_code}</p>
    <p><strong>ID Number:</strong> {identification_number}</p>
    <p><strong>Status:</strong> Pending Review</p>
  </div>
  <p>You will receive another email once your registration has been
     processed.</p>
  <p>Best regards,<br>The MARMA Team</p>
</div>
"#,
            full_name = registration.full_name,
            email = registration.email,
            country = registration.country,
            regional_code = registration.regional_code,
            identification_number = registration.identification_number,
        );

        self.send_html(
            &registration.email,
            "MARMA Registration Confirmation",
            html_body,
        )
        .await
    }

    async fn status_changed(
        &self,
        registration: &Registration,
        decision: Decision,
        message: &str,
    ) -> Result<(), NotifyError> {
        let (subject, headline, body_text) = match decision {
            Decision::Approved => (
                "MARMA Registration Approved",
                "Your registration has been approved",
                "Welcome to the Mano River Ministerial Alliance. Your \
                 membership is now active.",
            ),
            Decision::Declined => (
                "MARMA Registration Update",
                "Your registration was not approved",
                "After review, your registration could not be approved at \
                 this time.",
            ),
        };

        let reviewer_note = if message.is_empty() {
            String::new()
        } else {
            format!(
                r#"<div style="background-color: #f5f5f5; padding: 15px; border-radius: 5px;">
  <p><strong>Message from the review team:</strong></p>
  <p>{message}</p>
</div>"#
            )
        };

        let html_body = format!(
            r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="color: #003366;">Mano River Ministerial Alliance</h2>
  <p>Dear {full_name},</p>
  <h3>{headline}</h3>
  <p>{body_text}</p>
  <p><strong>Regional Code:</strong> {regional_code}<br>
     <strong>ID Number:</strong> {identification_number}</p>
  {reviewer_note}
  <p>Best regards,<br>The MARMA Team</p>
</div>
"#,
            full_name = registration.full_name,
            regional_code = registration.regional_code,
            identification_number = registration.identification_number,
        );

        self.send_html(&registration.email, subject, html_body).await
    }
}
