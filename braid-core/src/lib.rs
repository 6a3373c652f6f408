//! Core vocabulary of the braid gRPC client transport.
//!
//! This crate holds the leaf types shared by the transport and balancer
//! layers:
//!
//! - [`Code`] / [`Status`]: the canonical result space every RPC
//!   terminates in, with [`Status::from_error`] recovering a status from
//!   an error chain.
//! - [`Metadata`] and its wire codec ([`wire`]): ordered key/value
//!   metadata with base64-framed binary headers.
//! - [`Attributes`]: type-identified bags for balancer- and
//!   resolver-private data.
//! - [`SyncContext`]: the serial executor that linearizes balancer and
//!   channel state mutations.

pub mod attributes;
pub mod metadata;
pub mod status;
pub mod sync_context;
pub mod wire;

pub use attributes::{Attributes, Key};
pub use metadata::{BINARY_HEADER_SUFFIX, Metadata, is_binary_key};
pub use status::{Code, GRPC_MESSAGE_KEY, GRPC_STATUS_KEY, Status, StatusError};
pub use sync_context::{ScheduledExecutor, ScheduledHandle, SyncContext};
