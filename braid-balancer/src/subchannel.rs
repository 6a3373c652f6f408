//! Subchannels: logical connections owned by the channel, handed to
//! balancers.
//!
//! A subchannel is bound to one or more equivalent address groups and
//! owns at most one active transport. Prior transports that were shut
//! down but have not yet terminated are tracked until they drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use braid_core::{Attributes, Code, Status};

use crate::addresses::EquivalentAddressGroup;
use crate::state::{ConnectivityState, ConnectivityStateInfo};

/// A live connection owned by a subchannel. Implemented by the channel's
/// transport glue.
pub trait Transport: Send + Sync {
    /// Stop accepting new streams and drain; existing streams finish with
    /// `reason` if the peer disappears.
    fn shutdown(&self, reason: Status);

    /// True once every stream is done and resources are released.
    fn is_terminated(&self) -> bool;
}

struct SubchannelState {
    addresses: Vec<EquivalentAddressGroup>,
    info: ConnectivityStateInfo,
    active_transport: Option<Arc<dyn Transport>>,
    /// Shut-down transports that have not terminated yet.
    draining: Vec<Arc<dyn Transport>>,
}

struct Inner {
    attributes: Attributes,
    state: Mutex<SubchannelState>,
    connection_requested: AtomicBool,
}

/// Handle to a subchannel. Clones share identity; equality is identity.
#[derive(Clone)]
pub struct Subchannel {
    inner: Arc<Inner>,
}

impl Subchannel {
    pub fn new(addresses: Vec<EquivalentAddressGroup>, attributes: Attributes) -> Self {
        Self {
            inner: Arc::new(Inner {
                attributes,
                state: Mutex::new(SubchannelState {
                    addresses,
                    info: ConnectivityStateInfo::for_state(ConnectivityState::Idle),
                    active_transport: None,
                    draining: Vec::new(),
                }),
                connection_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.inner.attributes
    }

    pub fn all_addresses(&self) -> Vec<EquivalentAddressGroup> {
        self.lock().addresses.clone()
    }

    pub fn state(&self) -> ConnectivityState {
        self.lock().info.state()
    }

    pub fn state_info(&self) -> ConnectivityStateInfo {
        self.lock().info.clone()
    }

    /// Ask the owner to establish a transport if there is none.
    pub fn request_connection(&self) {
        self.inner.connection_requested.store(true, Ordering::Release);
    }

    pub fn connection_requested(&self) -> bool {
        self.inner.connection_requested.load(Ordering::Acquire)
    }

    /// Record a connectivity transition. SHUTDOWN is terminal: later
    /// transitions are ignored.
    pub fn set_state(&self, info: ConnectivityStateInfo) {
        let mut state = self.lock();
        if state.info.state() == ConnectivityState::Shutdown {
            return;
        }
        state.info = info;
    }

    /// Install a new active transport; the previous one drains.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        let mut state = self.lock();
        if let Some(previous) = state.active_transport.take() {
            state.draining.push(previous);
        }
        state.active_transport = Some(transport);
    }

    /// Replace the bound addresses. An existing connection to an address
    /// still present keeps being used.
    pub fn update_addresses(&self, addresses: Vec<EquivalentAddressGroup>) {
        self.lock().addresses = addresses;
    }

    /// Shut the subchannel down: all transports drain and the state goes
    /// to SHUTDOWN permanently.
    pub fn shutdown(&self) {
        let reason = Status::new(Code::Unavailable).with_description("subchannel shut down");
        let mut state = self.lock();
        state.info = ConnectivityStateInfo::for_state(ConnectivityState::Shutdown);
        if let Some(active) = state.active_transport.take() {
            state.draining.push(active);
        }
        for transport in &state.draining {
            transport.shutdown(reason.clone());
        }
        state.draining.retain(|t| !t.is_terminated());
    }

    /// Drop draining transports that have terminated.
    pub fn reap_terminated(&self) {
        self.lock().draining.retain(|t| !t.is_terminated());
    }

    /// Number of shut-down transports still draining.
    pub fn draining_transports(&self) -> usize {
        self.lock().draining.len()
    }

    pub fn has_active_transport(&self) -> bool {
        self.lock().active_transport.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubchannelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Subchannel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Subchannel {}

impl std::fmt::Debug for Subchannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Subchannel")
            .field("addresses", &state.addresses)
            .field("state", &state.info.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn group() -> EquivalentAddressGroup {
        EquivalentAddressGroup::new(vec![SocketAddr::from(([10, 0, 0, 1], 50051))])
    }

    #[derive(Default)]
    struct FakeTransport {
        shut_down: AtomicBool,
        terminated: AtomicBool,
    }

    impl Transport for FakeTransport {
        fn shutdown(&self, _reason: Status) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
        fn is_terminated(&self) -> bool {
            self.terminated.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn starts_idle() {
        let subchannel = Subchannel::new(vec![group()], Attributes::new());
        assert_eq!(subchannel.state(), ConnectivityState::Idle);
        assert!(!subchannel.connection_requested());
    }

    #[test]
    fn identity_equality() {
        let a = Subchannel::new(vec![group()], Attributes::new());
        let b = Subchannel::new(vec![group()], Attributes::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn replacing_the_transport_drains_the_old_one() {
        let subchannel = Subchannel::new(vec![group()], Attributes::new());
        let first: Arc<FakeTransport> = Arc::new(FakeTransport::default());
        let second: Arc<FakeTransport> = Arc::new(FakeTransport::default());

        subchannel.set_transport(first.clone());
        subchannel.set_transport(second);
        assert_eq!(subchannel.draining_transports(), 1);

        first.terminated.store(true, Ordering::SeqCst);
        subchannel.reap_terminated();
        assert_eq!(subchannel.draining_transports(), 0);
        assert!(subchannel.has_active_transport());
    }

    #[test]
    fn shutdown_is_terminal() {
        let subchannel = Subchannel::new(vec![group()], Attributes::new());
        let transport: Arc<FakeTransport> = Arc::new(FakeTransport::default());
        subchannel.set_transport(transport.clone());

        subchannel.shutdown();
        assert_eq!(subchannel.state(), ConnectivityState::Shutdown);
        assert!(transport.shut_down.load(Ordering::SeqCst));
        // Still draining until the transport terminates.
        assert_eq!(subchannel.draining_transports(), 1);

        subchannel.set_state(ConnectivityStateInfo::for_state(ConnectivityState::Ready));
        assert_eq!(subchannel.state(), ConnectivityState::Shutdown);
    }

    #[test]
    fn update_addresses_replaces_the_groups() {
        let subchannel = Subchannel::new(vec![group()], Attributes::new());
        let replacement =
            EquivalentAddressGroup::new(vec![SocketAddr::from(([10, 0, 0, 2], 50051))]);
        subchannel.update_addresses(vec![replacement.clone(), group()]);
        assert_eq!(subchannel.all_addresses().len(), 2);
    }
}
