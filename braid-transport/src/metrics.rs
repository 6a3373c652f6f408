//! Transport metrics, exposed through the metriken registry.

use metriken::{Counter, metric};

#[metric(
    name = "braid/streams/created",
    description = "Streams admitted onto a connection"
)]
pub static STREAMS_CREATED: Counter = Counter::new();

#[metric(
    name = "braid/streams/failed",
    description = "Streams that terminated with a non-OK status"
)]
pub static STREAMS_FAILED: Counter = Counter::new();

#[metric(
    name = "braid/messages/received",
    description = "Complete gRPC messages delivered to stream listeners"
)]
pub static MESSAGES_RECEIVED: Counter = Counter::new();

#[metric(
    name = "braid/connection/goaway",
    description = "GOAWAY frames observed on connections"
)]
pub static GOAWAY_RECEIVED: Counter = Counter::new();
