//! Background tasks owned by the process.

pub mod rate_producer;

pub use rate_producer::{RateProducer, RateProducerHandle};
