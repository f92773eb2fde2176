use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
    request::RpcError as RequestError,
};
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Upstream RPC failures
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    /// Error returned by the RPC server
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    Response {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON-RPC code the node returns while it is behind the cluster
pub const NODE_UNHEALTHY_CODE: i64 = -32005;

impl RpcError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimited { .. } => true,
            RpcError::BlockhashNotFound { .. } => true,

            // Server-side failures and unhealthy nodes clear up on their own
            RpcError::Response { code, .. } => match code {
                Some(c) => (500..600).contains(c) || *c == NODE_UNHEALTHY_CODE,
                None => false,
            },

            RpcError::Internal(_) => false,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. } => Some(endpoint),
            RpcError::Timeout { endpoint, .. } => Some(endpoint),
            RpcError::RateLimited { endpoint } => Some(endpoint),
            RpcError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcError::Response { endpoint, .. } => Some(endpoint),
            RpcError::Internal(_) => None,
        }
    }

    /// Classify a client error by its kind, falling back to its message
    pub fn from_client_error(err: &ClientError, endpoint: &str, timeout_ms: u64) -> Self {
        let message = err.to_string();
        match err.kind() {
            ClientErrorKind::Reqwest(e) if e.is_timeout() => RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            },
            ClientErrorKind::Reqwest(e) => match e.status().map(|s| i64::from(s.as_u16())) {
                Some(429) => RpcError::RateLimited {
                    endpoint: endpoint.to_string(),
                },
                Some(code) => RpcError::Response {
                    endpoint: endpoint.to_string(),
                    message,
                    code: Some(code),
                },
                None if e.is_connect() || e.is_request() => RpcError::Transport {
                    endpoint: endpoint.to_string(),
                    message,
                },
                None => Self::from_message(&message, endpoint, timeout_ms),
            },
            ClientErrorKind::RpcError(RequestError::RpcResponseError { code, message, .. }) => {
                if message.to_lowercase().contains("blockhash not found") {
                    RpcError::BlockhashNotFound {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    RpcError::Response {
                        endpoint: endpoint.to_string(),
                        message: message.clone(),
                        code: Some(*code),
                    }
                }
            }
            ClientErrorKind::Io(_) => RpcError::Transport {
                endpoint: endpoint.to_string(),
                message,
            },
            ClientErrorKind::TransactionError(TransactionError::BlockhashNotFound) => {
                RpcError::BlockhashNotFound {
                    endpoint: endpoint.to_string(),
                }
            }
            _ => Self::from_message(&message, endpoint, timeout_ms),
        }
    }

    /// Classify an error message from the client library
    pub fn from_message(message: &str, endpoint: &str, timeout_ms: u64) -> Self {
        let lower = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if lower.contains("blockhash not found") {
            RpcError::BlockhashNotFound { endpoint }
        } else if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            RpcError::RateLimited { endpoint }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            RpcError::Timeout {
                endpoint,
                timeout_ms,
            }
        } else if lower.contains("error sending request")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("dns error")
        {
            RpcError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else if lower.contains("node is behind") || lower.contains("node is unhealthy") {
            RpcError::Response {
                endpoint,
                message: message.to_string(),
                code: Some(NODE_UNHEALTHY_CODE),
            }
        } else {
            RpcError::Response {
                endpoint,
                message: message.to_string(),
                code: response_code(&lower),
            }
        }
    }
}

// "RPC response error -32004: ...", "HTTP status server error (503 ...)" or "code: 503"
fn response_code(lower: &str) -> Option<i64> {
    if let Some(rest) = lower.split("rpc response error ").nth(1) {
        return rest.split(':').next().and_then(|c| c.trim().parse().ok());
    }
    if let Some(rest) = lower.split("http status").nth(1) {
        return rest
            .split('(')
            .nth(1)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|c| c.parse().ok());
    }
    lower
        .split("code:")
        .nth(1)
        .and_then(|s| s.split_whitespace().next())
        .map(|s| s.trim_end_matches([',', ')']))
        .and_then(|s| s.parse().ok())
}
