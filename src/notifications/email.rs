//! SMTP delivery and email templates.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Notification, Notifier};
use crate::config::EmailConfig;

/// Sends notifications through the configured SMTP relay
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let (html, text) = render(notification);
        self.send_email(notification.recipient(), &notification.subject(), &html, &text)
            .await
    }
}

/// Render the HTML and plain text bodies for a notification
pub fn render(notification: &Notification) -> (String, String) {
    match notification {
        Notification::SignupOtp {
            code, ttl_minutes, ..
        } => (
            format!(
                "<p>Your CraveIt verification code is <strong>{code}</strong>.</p>\
                 <p>It will expire in {ttl_minutes} minutes.</p>\
                 <p>If you did not try to sign up, you can ignore this email.</p>",
                code = html_escape(code),
            ),
            format!(
                "Your CraveIt verification code is {code}. It will expire in {ttl_minutes} minutes.\n\n\
                 If you did not try to sign up, you can ignore this email."
            ),
        ),
        Notification::ApplicationApproved {
            username,
            business_name,
            ..
        } => (
            format!(
                "<p>Hello <strong>{username}</strong>,</p>\
                 <p>Congratulations! Your vendor application for <strong>{business_name}</strong> has been \
                 <span style=\"color:green;font-weight:bold;\">approved</span>.</p>\
                 <p>You can now log in to your account and start managing your vendor profile.</p>\
                 <p>Best regards,<br/>Team CraveIt</p>",
                username = html_escape(username),
                business_name = html_escape(business_name),
            ),
            format!(
                "Hello {username},\n\n\
                 Congratulations! Your vendor application for {business_name} has been approved.\n\
                 You can now log in to your account and start managing your vendor profile.\n\n\
                 Best regards,\nTeam CraveIt"
            ),
        ),
        Notification::ApplicationRejected {
            username,
            business_name,
            reason,
            ..
        } => {
            let reason_html = reason
                .as_deref()
                .map(|r| format!("<p><b>Reason:</b> {}</p>", html_escape(r)))
                .unwrap_or_default();
            let reason_text = reason
                .as_deref()
                .map(|r| format!("Reason: {}\n", r))
                .unwrap_or_default();
            (
                format!(
                    "<p>Hello <strong>{username}</strong>,</p>\
                     <p>We regret to inform you that your vendor application for <strong>{business_name}</strong> \
                     has been <span style=\"color:red;font-weight:bold;\">rejected</span>.</p>\
                     {reason_html}\
                     <p>You may apply again with updated details.</p>\
                     <p>- Team CraveIt</p>",
                    username = html_escape(username),
                    business_name = html_escape(business_name),
                ),
                format!(
                    "Hello {username},\n\n\
                     We regret to inform you that your vendor application for {business_name} has been rejected.\n\
                     {reason_text}\
                     You may apply again with updated details.\n\n\
                     - Team CraveIt"
                ),
            )
        }
    }
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
