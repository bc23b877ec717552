//! Background email delivery.
//!
//! Request handlers hand messages to [`Notifier::dispatch`], which never
//! blocks and never fails the caller. A single worker task drains the queue;
//! delivery errors are logged there and go no further.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::templates::EmailMessage;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Logs messages instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "email notification (not delivered: no mail transport configured)"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<EmailMessage>,
}

impl Notifier {
    /// Starts the worker and returns the handle used to enqueue messages.
    pub fn spawn(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(mailer, rx));
        (Self { tx }, worker)
    }

    /// Enqueues without waiting. A full or closed queue drops the message.
    pub fn dispatch(&self, message: EmailMessage) {
        match self.tx.try_send(message) {
            Ok(()) => debug!("email queued"),
            Err(TrySendError::Full(m)) => {
                warn!(to = %m.to, subject = %m.subject, "email queue full; message dropped")
            }
            Err(TrySendError::Closed(m)) => {
                error!(to = %m.to, subject = %m.subject, "email worker stopped; message dropped")
            }
        }
    }
}

async fn run_worker(mailer: Arc<dyn Mailer>, mut rx: mpsc::Receiver<EmailMessage>) {
    while let Some(message) = rx.recv().await {
        // A panicking mailer must not take the worker down with it.
        let mailer = mailer.clone();
        let to = message.to.clone();
        let outcome = tokio::spawn(async move { mailer.send(&message).await }).await;
        match outcome {
            Ok(Ok(())) => debug!(to = %to, "email sent"),
            Ok(Err(e)) => warn!(to = %to, error = %e, "email delivery failed"),
            Err(e) => error!(to = %to, error = %e, "email delivery task panicked"),
        }
    }
    debug!("email worker stopped");
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::RecordingMailer;
    use super::*;

    fn msg(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.into(),
            subject: "hi".into(),
            body: "body".into(),
        }
    }

    #[tokio::test]
    async fn failures_are_contained_and_worker_keeps_going() {
        let mailer = Arc::new(RecordingMailer {
            fail_for: vec!["bad@x.com".into()],
            ..Default::default()
        });
        let (notifier, worker) = Notifier::spawn(mailer.clone(), 8);

        notifier.dispatch(msg("bad@x.com"));
        notifier.dispatch(msg("panic@x.com"));
        notifier.dispatch(msg("good@x.com"));
        drop(notifier);

        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should drain and stop")
            .expect("worker should not panic");
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "good@x.com");
    }

    #[tokio::test]
    async fn dispatch_never_blocks_when_queue_is_full() {
        struct StuckMailer;
        #[async_trait]
        impl Mailer for StuckMailer {
            async fn send(&self, _: &EmailMessage) -> anyhow::Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let (notifier, _worker) = Notifier::spawn(Arc::new(StuckMailer), 1);
        let started = std::time::Instant::now();
        for i in 0..20 {
            notifier.dispatch(msg(&format!("user{i}@x.com")));
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
