//! Consumer offset bookkeeping.
//!
//! [`OffsetTracker`] exposes the consumer's current assignment and read
//! position. The transactional path only reads them; the publisher attaches
//! the position to its transaction. `commit_all` is a plain, non-atomic
//! commit for checkpoints outside that path.

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerGroupMetadata, StreamConsumer};
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{OffsetError, TransportFault};

/// One partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// Partitions currently owned by this consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerAssignment {
    partitions: Vec<TopicPartition>,
}

impl ConsumerAssignment {
    pub fn new(partitions: Vec<TopicPartition>) -> Self {
        Self { partitions }
    }

    pub fn partitions(&self) -> &[TopicPartition] {
        &self.partitions
    }

    pub fn contains(&self, topic: &str, partition: i32) -> bool {
        self.partitions
            .iter()
            .any(|tp| tp.topic == topic && tp.partition == partition)
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Next-read offset of one partition.
///
/// `offset` is `None` when the consumer has no valid position yet; such
/// partitions are left out of commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
}

impl OffsetPosition {
    pub fn new(topic: impl Into<String>, partition: i32, offset: Option<i64>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// Build the partition list for a commit, skipping partitions without a
/// valid position.
pub fn positions_to_tpl(positions: &[OffsetPosition]) -> Result<TopicPartitionList, TransportFault> {
    let mut tpl = TopicPartitionList::new();
    for position in positions {
        if let Some(offset) = position.offset {
            tpl.add_partition_offset(&position.topic, position.partition, Offset::Offset(offset))?;
        }
    }
    Ok(tpl)
}

/// Read access to a consumer group's assignment and position.
#[async_trait]
pub trait OffsetTracker: Send + Sync {
    /// Group identity attached to transactional offset commits.
    type GroupMetadata: Send + 'static;

    /// Partitions owned right now.
    async fn current_assignment(&self) -> Result<ConsumerAssignment, OffsetError>;

    /// Next-read offset for each partition of `assignment`.
    async fn current_position(
        &self,
        assignment: &ConsumerAssignment,
    ) -> Result<Vec<OffsetPosition>, OffsetError>;

    async fn group_metadata(&self) -> Result<Self::GroupMetadata, OffsetError>;

    /// Commit the given positions directly, outside any transaction.
    async fn commit_positions(&self, positions: &[OffsetPosition]) -> Result<(), OffsetError>;

    /// Commit the full current position. Not atomic with any produce; never
    /// use it on the exactly-once path.
    async fn commit_all(&self) -> Result<(), OffsetError> {
        let assignment = self.current_assignment().await?;
        if assignment.is_empty() {
            return Ok(());
        }
        let positions = self.current_position(&assignment).await?;
        self.commit_positions(&positions).await
    }
}

/// Offset tracker backed by the worker's `StreamConsumer`.
pub struct KafkaOffsetTracker {
    consumer: Arc<StreamConsumer>,
}

impl KafkaOffsetTracker {
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl OffsetTracker for KafkaOffsetTracker {
    type GroupMetadata = ConsumerGroupMetadata;

    async fn current_assignment(&self) -> Result<ConsumerAssignment, OffsetError> {
        let tpl = self
            .consumer
            .assignment()
            .map_err(|e| OffsetError::Assignment(e.into()))?;

        let partitions = tpl
            .elements()
            .iter()
            .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
            .collect();
        Ok(ConsumerAssignment::new(partitions))
    }

    async fn current_position(
        &self,
        assignment: &ConsumerAssignment,
    ) -> Result<Vec<OffsetPosition>, OffsetError> {
        // position() covers the whole assignment; keep only what was asked.
        let tpl = self
            .consumer
            .position()
            .map_err(|e| OffsetError::Position(e.into()))?;

        let positions = tpl
            .elements()
            .iter()
            .filter(|elem| assignment.contains(elem.topic(), elem.partition()))
            .map(|elem| {
                let offset = match elem.offset() {
                    Offset::Offset(n) => Some(n),
                    _ => None,
                };
                OffsetPosition::new(elem.topic(), elem.partition(), offset)
            })
            .collect();
        Ok(positions)
    }

    async fn group_metadata(&self) -> Result<ConsumerGroupMetadata, OffsetError> {
        self.consumer
            .group_metadata()
            .ok_or(OffsetError::GroupMetadataUnavailable)
    }

    async fn commit_positions(&self, positions: &[OffsetPosition]) -> Result<(), OffsetError> {
        let tpl = positions_to_tpl(positions).map_err(OffsetError::Commit)?;
        if tpl.count() == 0 {
            return Ok(());
        }

        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| OffsetError::Commit(TransportFault::other(e.to_string())))?
            .map_err(|e| OffsetError::Commit(e.into()))?;

        debug!(partitions = positions.len(), "Committed consumer offsets");
        Ok(())
    }
}
