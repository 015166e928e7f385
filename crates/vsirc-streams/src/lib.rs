//! Event-source clients for validated-streams responders.
//!
//! [`GrpcEventSource`] speaks the node's `validated_streams.Streams` gRPC
//! service. [`HttpEventSource`] is a non-standard HTTP/NDJSON adapter for
//! gateways that front a node over plain HTTP. [`LoopbackEventSource`]
//! confirms every submitted event in-process.

pub mod grpc_event_source;
pub mod http_event_source;
pub mod loopback_event_source;

pub use grpc_event_source::{
    status_error, GrpcEventSource, GrpcEventSourceConfig, DEFAULT_GRPC_PORT,
};
pub use http_event_source::{HttpEventSource, HttpEventSourceConfig, NdjsonBatchDecoder};
pub use loopback_event_source::LoopbackEventSource;
