use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hux_model::Event;

use crate::correlator::Correlator;
use crate::error::CoreError;

/// Owns the pub/sub subscription and forwards every received payload to the
/// correlator, one message at a time, in delivery order.
pub struct EventListener {
    client: redis::Client,
    channel: String,
    correlator: Correlator,
}

impl EventListener {
    /// Create a listener that subscribes to `channel` on `client` and
    /// drives `correlator` with the decoded events.
    pub fn new(client: redis::Client, channel: impl Into<String>, correlator: Correlator) -> Self {
        Self {
            client,
            channel: channel.into(),
            correlator,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. A failed subscribe, or the message
    /// stream ending while the loop is still wanted, is fatal and reported
    /// to the caller; restart policy lives outside this loop.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), CoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "subscribed to event channel");

        let messages = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        self.pump(messages, cancel).await
    }

    async fn pump<S>(&mut self, messages: S, cancel: CancellationToken) -> Result<(), CoreError>
    where
        S: Stream<Item = Vec<u8>>,
    {
        tokio::pin!(messages);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(in_flight = self.correlator.in_flight(), "event listener stopped");
                    return Ok(());
                }
                msg = messages.next() => match msg {
                    Some(payload) => self.dispatch(&payload),
                    None => return Err(CoreError::ChannelClosed),
                },
            }
        }
    }

    fn dispatch(&mut self, payload: &[u8]) {
        match Event::decode(payload) {
            Ok(event) => {
                debug!(
                    kind = ?event.kind,
                    task_name = %event.task_name,
                    task_id = %event.task_id,
                    "event received"
                );
                self.correlator.apply(&event);
            }
            Err(err) => warn!("dropping malformed event payload: {}", err),
        }
    }
}
