//! Redis adapters.
//!
//! - `RedisStreamPublisher` - Publishes decoded outbox events to Redis Streams

mod stream_publisher;

pub use stream_publisher::{connect, RedisStreamPublisher};
