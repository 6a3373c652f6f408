//! Resolved server addresses handed to the balancer.

use std::net::SocketAddr;

use braid_core::Attributes;

/// A group of addresses considered equivalent: connecting to any of them
/// reaches the same logical server.
#[derive(Debug, Clone, Default)]
pub struct EquivalentAddressGroup {
    addresses: Vec<SocketAddr>,
    attributes: Attributes,
}

impl EquivalentAddressGroup {
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self {
            addresses,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// The output of one name-resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAddresses {
    /// Resolved server groups. May be empty; see
    /// [`crate::balancer::deliver_resolution_result`].
    pub servers: Vec<EquivalentAddressGroup>,
    /// Extra information from the naming system.
    pub attributes: Attributes,
    /// Parsed load-balancing policy config, if the service config carried
    /// one.
    pub policy_config: Option<serde_json::Value>,
}

impl ResolvedAddresses {
    pub fn new(servers: Vec<EquivalentAddressGroup>) -> Self {
        Self {
            servers,
            attributes: Attributes::new(),
            policy_config: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn group_holds_addresses() {
        let group = EquivalentAddressGroup::new(vec![addr(50051), addr(50052)]);
        assert_eq!(group.addresses().len(), 2);
        assert!(group.attributes().is_empty());
    }

    #[test]
    fn resolved_addresses_carry_policy_config() {
        let resolved = ResolvedAddresses {
            policy_config: Some(serde_json::json!({ "round_robin": {} })),
            ..ResolvedAddresses::new(vec![EquivalentAddressGroup::new(vec![addr(1)])])
        };
        assert!(resolved.policy_config.is_some());
        assert_eq!(resolved.servers.len(), 1);
    }
}
