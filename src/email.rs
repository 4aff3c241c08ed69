//! Outbound mail. Delivery is always best-effort: callers hand the send
//! future to [`spawn_send`], which detaches it from the request path and
//! logs a failure instead of surfacing it.

use std::future::Future;

use axum::async_trait;
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport, Message,
    Tokio1Executor,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(&self, email: &str, code: &str) -> anyhow::Result<()>;
    async fn send_order_confirmation(
        &self,
        email: &str,
        order_id: Uuid,
        total: Decimal,
    ) -> anyhow::Result<()>;
}

/// Fire a mail send as a detached task. The caller returns immediately;
/// delivery latency or failure never reaches the request that triggered it.
pub fn spawn_send<F>(kind: &'static str, send: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = send.await {
            tracing::warn!(error = %err, kind, "email delivery failed");
        }
    });
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    async fn send_text(&self, to: &str, subject: &str, body: String) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .body(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.send_text(
            email,
            "Verify your Maison account",
            format!(
                "Welcome to Maison!\n\nYour verification code is {code}.\n\
                 It expires in 24 hours. If you didn't create this account, ignore this email.\n"
            ),
        )
        .await
    }

    async fn send_order_confirmation(
        &self,
        email: &str,
        order_id: Uuid,
        total: Decimal,
    ) -> anyhow::Result<()> {
        self.send_text(
            email,
            &format!("Order confirmation #{order_id}"),
            format!(
                "Thank you for your order!\n\nOrder #{order_id}\nTotal: {total}\n\n\
                 We'll send you shipping updates as your order progresses.\n"
            ),
        )
        .await
    }
}

/// Stand-in used when SMTP is not configured: the mail contents go to the
/// log and nothing leaves the process.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(%email, %code, "verification email (log only)");
        Ok(())
    }

    async fn send_order_confirmation(
        &self,
        email: &str,
        order_id: Uuid,
        total: Decimal,
    ) -> anyhow::Result<()> {
        tracing::info!(%email, %order_id, %total, "order confirmation email (log only)");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SentMail {
        Verification { to: String, code: String },
        OrderConfirmation { to: String, order_id: Uuid, total: Decimal },
    }

    /// Records every send; tests assert on `sent`.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<SentMail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_verification_email(&self, email: &str, code: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(SentMail::Verification {
                to: email.to_string(),
                code: code.to_string(),
            });
            Ok(())
        }

        async fn send_order_confirmation(
            &self,
            email: &str,
            order_id: Uuid,
            total: Decimal,
        ) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(SentMail::OrderConfirmation {
                to: email.to_string(),
                order_id,
                total,
            });
            Ok(())
        }
    }

    /// A mailer whose sends always fail; used to show delivery failures stay
    /// off the request path.
    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_verification_email(&self, _email: &str, _code: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }

        async fn send_order_confirmation(
            &self,
            _email: &str,
            _order_id: Uuid,
            _total: Decimal,
        ) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }
}
