//! Capability negotiation during initialization.

use crate::types::{ClientCapabilities, InitializeParams, InitializeResult, MCP_VERSION};

/// What the client announced, and whether the handshake finished.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub client: ClientCapabilities,
    pub client_name: Option<String>,
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    pub fn negotiate(&mut self, params: InitializeParams) -> InitializeResult {
        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                "Client requested protocol version {}, server supports {}. Proceeding with server version.",
                params.protocol_version,
                MCP_VERSION
            );
        }

        tracing::info!(
            "Initialized with client: {} v{}",
            params.client_info.name,
            params.client_info.version
        );
        self.client = params.capabilities;
        self.client_name = Some(params.client_info.name);

        InitializeResult::default_result()
    }

    pub fn mark_initialized(&mut self) {
        if self.initialized {
            tracing::debug!("Duplicate initialized notification");
            return;
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Implementation;

    #[test]
    fn test_negotiate_records_client() {
        let mut caps = NegotiatedCapabilities::default();
        let result = caps.negotiate(InitializeParams {
            protocol_version: "2099-01-01".to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "probe".to_string(),
                version: "0.1".to_string(),
            },
        });
        assert_eq!(result.protocol_version, MCP_VERSION);
        assert_eq!(caps.client_name.as_deref(), Some("probe"));
        assert!(!caps.initialized);

        caps.mark_initialized();
        caps.mark_initialized();
        assert!(caps.initialized);
    }
}
