//! The producer/consumer pair connecting local rooms to the shared Kafka
//! topic. Records are keyed by room id, so the broker preserves per-room
//! submission order across instances.

pub mod consumer;
pub mod producer;
