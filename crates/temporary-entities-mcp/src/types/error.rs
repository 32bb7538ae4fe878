//! Server errors and their JSON-RPC codes.

use temporary_entities::{ConfigError, EntityError};

use super::message::{JsonRpcError, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Server-specific error codes.
pub mod mcp_error_codes {
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const ENTITY_NOT_FOUND: i32 = -32850;
    pub const UNSUPPORTED_OPERATION: i32 = -32851;
    pub const INVALID_TRANSITION: i32 = -32852;
    pub const STORAGE_ERROR: i32 = -32853;
}

#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::Config(_) => INVALID_PARAMS,
            McpError::InternalError(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::EntityNotFound(_) => ENTITY_NOT_FOUND,
            McpError::UnsupportedOperation(_) => UNSUPPORTED_OPERATION,
            McpError::InvalidTransition(_) => INVALID_TRANSITION,
            McpError::Storage(_) => STORAGE_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError::new(id, self.code(), self.to_string())
    }
}

impl From<EntityError> for McpError {
    fn from(e: EntityError) -> Self {
        match e {
            EntityError::NotFound(id) => McpError::EntityNotFound(id.to_string()),
            e @ EntityError::UnsupportedOperation { .. } => McpError::UnsupportedOperation(e.to_string()),
            e @ EntityError::InvalidTransition { .. } => McpError::InvalidTransition(e.to_string()),
            EntityError::Config(e) => McpError::Config(e),
            e @ EntityError::Removal { .. } => McpError::Storage(e.to_string()),
            e @ (EntityError::Restoration { .. } | EntityError::SchedulerUnavailable(_)) => {
                McpError::InternalError(e.to_string())
            }
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
