//! Outbound user notifications.
//!
//! Registration hands the activation token to a [`Notifier`]. Delivery is
//! fire-and-forget: the request has already committed, so failures are logged
//! and never surface to the client. [`LogNotifier`] is the only sender; it logs
//! instead of delivering.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

#[derive(Clone, Debug)]
pub struct ActivationNotice {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub token: SecretString,
}

/// Notification delivery abstraction.
pub trait Notifier: Send + Sync {
    /// Deliver the notice or return an error to have it logged.
    fn send_activation(&self, notice: &ActivationNotice) -> Result<()>;
}

/// Local dev sender that logs the notice instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_activation(&self, notice: &ActivationNotice) -> Result<()> {
        info!(
            user_id = notice.user_id,
            to_email = %notice.email,
            activation_token = %notice.token.expose_secret(),
            "activation notice send stub"
        );
        Ok(())
    }
}

/// Deliver on the blocking pool, detached from the request.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: ActivationNotice) {
    let span = info_span!("notify.activation", user_id = notice.user_id);
    tokio::spawn(
        async move {
            let result =
                tokio::task::spawn_blocking(move || notifier.send_activation(&notice)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Failed to send activation notice: {err:#}"),
                Err(err) => error!("Activation notice task failed: {err}"),
            }
        }
        .instrument(span),
    );
}
