//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job consumption through a consumer group with manual acknowledgement
//! - Reclaiming of stale deliveries and dead-lettering past a delivery limit
//! - Outcome notifications via Redis Pub/Sub

pub mod error;
pub mod notify;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use notify::{NotificationTransport, RedisNotificationChannel};
pub use queue::{ClaimOutcome, Delivery, DeliveryQueue, JobQueue, QueueConfig};
