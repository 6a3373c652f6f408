//! The stock pick-first balancing policy.
//!
//! One subchannel over the full resolved address list; the channel tries
//! the addresses in order and every RPC rides the first connection that
//! works.

use std::sync::Arc;

use braid_core::{Attributes, Status};

use crate::addresses::ResolvedAddresses;
use crate::balancer::{Helper, LoadBalancer};
use crate::picker::{PickArgs, PickResult, SubchannelPicker};
use crate::state::{ConnectivityState, ConnectivityStateInfo};
use crate::subchannel::Subchannel;

/// Always proceeds on the one connected subchannel.
struct ReadyPicker(Subchannel);

impl SubchannelPicker for ReadyPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::proceed(self.0.clone())
    }
}

/// Buffers while the subchannel is coming up.
struct QueuePicker;

impl SubchannelPicker for QueuePicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::NoResult
    }
}

/// Fails every pick with the last seen failure.
struct FailurePicker(Status);

impl SubchannelPicker for FailurePicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::error(self.0.clone())
    }
}

/// Pick-first: the default policy when the service config names none.
pub struct PickFirstBalancer {
    helper: Arc<dyn Helper>,
    subchannel: Option<Subchannel>,
}

impl PickFirstBalancer {
    pub fn new(helper: Arc<dyn Helper>) -> Self {
        Self {
            helper,
            subchannel: None,
        }
    }
}

impl LoadBalancer for PickFirstBalancer {
    fn handle_resolved_addresses(&mut self, resolved: ResolvedAddresses) {
        match &self.subchannel {
            None => {
                let subchannel = self
                    .helper
                    .create_subchannel(resolved.servers, Attributes::new());
                subchannel.request_connection();
                self.helper
                    .update_balancing_state(ConnectivityState::Connecting, Arc::new(QueuePicker));
                self.subchannel = Some(subchannel);
            }
            Some(subchannel) => {
                self.helper
                    .update_subchannel_addresses(subchannel, resolved.servers);
            }
        }
    }

    fn handle_name_resolution_error(&mut self, error: Status) {
        self.helper
            .channel_logger()
            .warn(&format!("name resolution failed: {error}"));
        self.helper.update_balancing_state(
            ConnectivityState::TransientFailure,
            Arc::new(FailurePicker(error)),
        );
    }

    fn handle_subchannel_state(&mut self, subchannel: &Subchannel, state: ConnectivityStateInfo) {
        if self.subchannel.as_ref() != Some(subchannel) {
            return;
        }
        let picker: Arc<dyn SubchannelPicker> = match state.state() {
            ConnectivityState::Ready => Arc::new(ReadyPicker(subchannel.clone())),
            ConnectivityState::Connecting => Arc::new(QueuePicker),
            ConnectivityState::Idle => {
                // The connection went away; reconnect and refresh in case
                // the addresses moved.
                self.helper.refresh_name_resolution();
                subchannel.request_connection();
                Arc::new(QueuePicker)
            }
            ConnectivityState::TransientFailure => {
                self.helper.refresh_name_resolution();
                Arc::new(FailurePicker(state.status().clone()))
            }
            // Our own shutdown already discarded the subchannel.
            ConnectivityState::Shutdown => return,
        };
        self.helper.update_balancing_state(state.state(), picker);
    }

    fn shutdown(&mut self) {
        if let Some(subchannel) = self.subchannel.take() {
            subchannel.shutdown();
        }
    }
}
