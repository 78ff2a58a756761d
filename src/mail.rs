//! Outbound mail
//!
//! Delivery is best-effort: sends run after the database commit and a
//! failure is only logged.

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, mail: Mail) -> anyhow::Result<()>;
}

/// Writes mails to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl MailDispatcher for LogDispatcher {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail queued: {}", mail.body);
        Ok(())
    }
}

/// Fire and forget
pub fn dispatch(mailer: Arc<dyn MailDispatcher>, mails: Vec<Mail>) {
    if mails.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for mail in mails {
            let to = mail.to.clone();
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!("Failed to send mail to {}: {}", to, e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Failing(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl MailDispatcher for Failing {
        async fn send(&self, mail: Mail) -> anyhow::Result<()> {
            let _ = self.0.send(mail.to);
            anyhow::bail!("smtp down")
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mails = ["a@x", "b@x"]
            .iter()
            .map(|to| Mail {
                to: to.to_string(),
                subject: "s".into(),
                body: "b".into(),
            })
            .collect();
        dispatch(Arc::new(Failing(tx)), mails);

        assert_eq!(rx.recv().await.as_deref(), Some("a@x"));
        assert_eq!(rx.recv().await.as_deref(), Some("b@x"));
    }

    #[tokio::test]
    async fn test_log_dispatcher_accepts() {
        let mail = Mail {
            to: "a@x".into(),
            subject: "hello".into(),
            body: "world".into(),
        };
        tokio_test::assert_ok!(LogDispatcher.send(mail).await);
    }
}
