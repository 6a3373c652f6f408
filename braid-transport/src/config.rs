//! Transport configuration.

/// Connection-level values used when synthesizing request headers.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Value of the `:authority` pseudo-header.
    pub authority: String,
    /// Value of the `:scheme` pseudo-header.
    pub scheme: String,
    /// Value of the `user-agent` header.
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            authority: String::new(),
            scheme: "https".to_string(),
            user_agent: concat!("braid/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
