use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use crate::config::NscaConfig;
use crate::error::Result;
use crate::protocol::channel::Channel;
use crate::protocol::dispatcher::{Dispatcher, Submission};
use crate::protocol::message::{Alert, Severity};

/// Application-facing handle for sending passive check results to one
/// service on one NSCA daemon.
///
/// Sends are queued on a shared [`Dispatcher`] and return immediately;
/// delivery failures are logged and counted, never returned.
///
/// ```rust,no_run
/// use nsca_protocol::config::NscaConfig;
/// use nsca_protocol::protocol::dispatcher::Dispatcher;
/// use nsca_protocol::protocol::message::Severity;
/// use nsca_protocol::service::client::NscaClient;
///
/// # async fn run() -> nsca_protocol::error::Result<()> {
/// let config = NscaConfig::from_file("nsca.toml")?;
/// let dispatcher = Dispatcher::new(config.pool.clone())?;
/// let client = NscaClient::from_config_async(&config, dispatcher.clone()).await?;
///
/// client.start();
/// client.send(Severity::Critical, "payment gateway unreachable");
///
/// dispatcher.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NscaClient {
    channel: Arc<Channel>,
    dispatcher: Dispatcher,
    startup: Mutex<Option<Alert>>,
}

impl NscaClient {
    pub fn new(channel: Channel, dispatcher: Dispatcher) -> Self {
        Self {
            channel: Arc::new(channel),
            dispatcher,
            startup: Mutex::new(None),
        }
    }

    /// Build the channel from `config.channel` and arm the configured
    /// startup alert, if any. May block on DNS; see [`Channel::from_config`].
    pub fn from_config(config: &NscaConfig, dispatcher: Dispatcher) -> Result<Self> {
        let channel = Channel::from_config(&config.channel)?;
        Ok(Self::with_startup(channel, dispatcher, config))
    }

    /// Like [`NscaClient::from_config`] without blocking the runtime.
    pub async fn from_config_async(config: &NscaConfig, dispatcher: Dispatcher) -> Result<Self> {
        let channel = Channel::from_config_async(&config.channel).await?;
        Ok(Self::with_startup(channel, dispatcher, config))
    }

    fn with_startup(channel: Channel, dispatcher: Dispatcher, config: &NscaConfig) -> Self {
        let client = Self::new(channel, dispatcher);
        if let Some(message) = config.startup.message.as_deref() {
            client.set_startup_message(config.startup.severity, message);
        }
        client
    }

    /// Queue an alert. Empty messages are ignored.
    #[instrument(skip(self, message), fields(service = %self.channel.service_name()))]
    pub fn send(&self, severity: Severity, message: impl Into<String>) -> Submission {
        let outcome = self.dispatcher.submit(&self.channel, severity, message);
        debug!(outcome = ?outcome, "Alert submitted");
        outcome
    }

    /// Arm an alert to be sent by the next call to [`NscaClient::start`].
    pub fn set_startup_message(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        let alert = (!message.is_empty()).then(|| Alert::new(severity, message));
        if let Ok(mut slot) = self.startup.lock() {
            *slot = alert;
        }
    }

    /// Send the armed startup alert, once. Returns `None` when nothing was armed.
    pub fn start(&self) -> Option<Submission> {
        let alert = self.startup.lock().ok().and_then(|mut slot| slot.take())?;
        Some(self.dispatcher.submit_alert(&self.channel, alert))
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
