//! The load-balancer contract of the braid gRPC client transport.
//!
//! A balancer receives resolved address groups and subchannel state
//! changes on one synchronization context and publishes
//! [`SubchannelPicker`]s through its [`Helper`]. Each picker makes the
//! per-RPC routing decision: proceed on a subchannel, fail, drop, or
//! buffer. Buffered RPCs live in a [`PickBuffer`] and are re-picked
//! whenever a new picker is published.
//!
//! Balancer callbacks must never block: the synchronization context may
//! be the network thread. Pickers are the only objects invoked
//! concurrently and must only mutate their own state.

pub mod addresses;
pub mod balancer;
pub mod buffer;
pub mod pick_first;
pub mod picker;
pub mod state;
pub mod subchannel;

pub use addresses::{EquivalentAddressGroup, ResolvedAddresses};
pub use balancer::{ChannelLogger, Helper, LoadBalancer, OobChannel, deliver_resolution_result};
pub use buffer::{BufferedCall, PickBuffer, PickOutcome};
pub use pick_first::PickFirstBalancer;
pub use picker::{
    CallOptions, PickArgs, PickResult, RoundRobinPicker, StreamTracer, StreamTracerFactory,
    SubchannelPicker,
};
pub use state::{ConnectivityState, ConnectivityStateInfo};
pub use subchannel::{Subchannel, Transport};
