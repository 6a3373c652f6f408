//! The balancer contract: the `LoadBalancer` trait and the channel
//! `Helper` it is driven through.
//!
//! Every `LoadBalancer` method and every Helper mutation runs on one
//! synchronization context; only pickers are invoked concurrently.
//! Never block in a callback: the context may be the network thread.

use std::sync::Arc;

use braid_core::{Attributes, Code, ScheduledExecutor, Status, SyncContext};

use crate::addresses::{EquivalentAddressGroup, ResolvedAddresses};
use crate::picker::SubchannelPicker;
use crate::state::{ConnectivityState, ConnectivityStateInfo};
use crate::subchannel::Subchannel;

/// A pluggable balancing policy.
pub trait LoadBalancer {
    /// Newly resolved server groups and attributes. The list is never
    /// empty unless [`LoadBalancer::can_handle_empty_address_list`]
    /// returns true.
    fn handle_resolved_addresses(&mut self, resolved: ResolvedAddresses);

    /// The name resolution system failed with a non-OK status.
    fn handle_name_resolution_error(&mut self, error: Status);

    /// A subchannel created by this balancer changed connectivity state.
    /// SHUTDOWN can be safely ignored.
    fn handle_subchannel_state(&mut self, subchannel: &Subchannel, state: ConnectivityStateInfo);

    /// Release all subchannels and OOB channels. No callbacks follow.
    fn shutdown(&mut self);

    /// Whether an empty resolved address list is acceptable. Must be a
    /// constant. When false (the default), the channel converts an empty
    /// list into [`LoadBalancer::handle_name_resolution_error`].
    fn can_handle_empty_address_list(&self) -> bool {
        false
    }
}

/// An out-of-band channel for a balancer's own RPCs (e.g. talking to an
/// external balancing service).
pub trait OobChannel: Send + Sync {
    fn authority(&self) -> String;
    fn shutdown(&self);
}

/// Channel-provided essentials for balancer implementations.
pub trait Helper: Send + Sync {
    /// Create a subchannel over equivalent address groups. Call from the
    /// synchronization context. The balancer owns the result and must
    /// shut it down when done.
    fn create_subchannel(
        &self,
        addresses: Vec<EquivalentAddressGroup>,
        attributes: Attributes,
    ) -> Subchannel;

    /// Replace the addresses of an existing subchannel; superior to
    /// recreating it when the sets overlap.
    fn update_subchannel_addresses(
        &self,
        subchannel: &Subchannel,
        addresses: Vec<EquivalentAddressGroup>,
    );

    /// Out-of-band channel to the given authority. The balancer must
    /// shut it down when done.
    fn create_oob_channel(
        &self,
        address_group: EquivalentAddressGroup,
        authority: &str,
    ) -> Arc<dyn OobChannel>;

    /// Publish a new connectivity state and picker. Buffered RPCs are
    /// re-picked through the new picker.
    fn update_balancing_state(&self, state: ConnectivityState, picker: Arc<dyn SubchannelPicker>);

    /// Ask the channel's resolver to refresh.
    fn refresh_name_resolution(&self);

    /// The context all balancer callbacks run on.
    fn sync_context(&self) -> Arc<SyncContext>;

    /// Timer source for delayed work scheduled into the context.
    fn scheduled_executor(&self) -> Arc<dyn ScheduledExecutor>;

    /// The channel authority, derived from the target name.
    fn authority(&self) -> String;

    fn channel_logger(&self) -> ChannelLogger;
}

/// Scoped logger for channel and balancer events.
#[derive(Debug, Clone)]
pub struct ChannelLogger {
    scope: String,
}

impl ChannelLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(channel = %self.scope, "{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!(channel = %self.scope, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(channel = %self.scope, "{message}");
    }
}

/// Route a resolver result to the balancer.
///
/// An empty address list becomes a name-resolution error unless the
/// balancer declares it can handle one.
pub fn deliver_resolution_result(balancer: &mut dyn LoadBalancer, resolved: ResolvedAddresses) {
    if resolved.servers.is_empty() && !balancer.can_handle_empty_address_list() {
        balancer.handle_name_resolution_error(
            Status::new(Code::Unavailable)
                .with_description("name resolver returned an empty address list"),
        );
    } else {
        balancer.handle_resolved_addresses(resolved);
    }
}
