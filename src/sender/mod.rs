//! Batch delivery to ClickHouse.

pub mod client;
pub mod pool;
pub mod serialization;
pub mod transmission;

pub use client::{ClickHouseClient, ClientConfig, ClientError, InsertResponse};
pub use pool::{BatchSink, DeliveryPool, PoolConfig, WorkerState};
pub use serialization::{BatchSerializer, SerializationError};
pub use transmission::{BatchTransmitter, SendOutcome};
