use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::channel::{EmailSender, NotifyError};

pub struct SmtpEmailSender {
    from: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    /// STARTTLS with login when credentials are given, plain SMTP otherwise.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: String,
    ) -> Result<Self, NotifyError> {
        let transport = match (username, password) {
            (Some(user), Some(pass)) => {
                let creds = Credentials::new(user.to_string(), pass.to_string());
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| NotifyError(e.to_string()))?
                    .port(port)
                    .credentials(creds)
                    .build()
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(port)
                .build(),
        };
        Ok(Self { from, transport })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send_email(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError(e.to_string()))?,
            )
            .subject(subject)
            .header(ContentType::TEXT_HTML);

        for rcpt in recipients {
            builder = builder.to(rcpt
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError(e.to_string()))?);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| NotifyError(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}
