//! Read-committed consumer factory.

use rdkafka::consumer::{Consumer, StreamConsumer};
use tracing::info;

use crate::errors::ClientError;
use crate::settings::KafkaSettings;

/// Create a consumer for `group_id` subscribed to `topics`.
///
/// The consumer only sees committed transactional data and never commits on
/// its own; offsets advance only through the publish protocol.
pub fn create_consumer(
    settings: &KafkaSettings,
    group_id: &str,
    topics: &[&str],
) -> Result<StreamConsumer, ClientError> {
    if topics.is_empty() {
        return Err(ClientError::config("no topics to subscribe to"));
    }

    let consumer: StreamConsumer = settings
        .consumer_config(group_id)
        .create()
        .map_err(|e| ClientError::Create(e.into()))?;

    consumer
        .subscribe(topics)
        .map_err(|e| ClientError::Create(e.into()))?;

    info!(
        group_id = %group_id,
        topics = ?topics,
        broker = %settings.broker,
        "Subscribed consumer"
    );
    Ok(consumer)
}
