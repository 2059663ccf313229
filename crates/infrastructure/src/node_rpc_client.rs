use async_trait::async_trait;
use peerwarden_application::{ActionOutcome, PeerControl, PeerSource};
use peerwarden_core::{AppError, AppResult};
use peerwarden_domain::Peer;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

const RPC_REQUEST_ID: &str = "peerwarden";

/// Basic-auth credentials for the node RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRpcCredentials {
    /// RPC user name.
    pub user: String,
    /// RPC password.
    pub password: Option<String>,
}

/// JSON-RPC client for a Bitcoin-Core-style node.
///
/// `getpeerinfo` backs peer listing; `setban` and `disconnectnode` back peer
/// control. Node-side errors on control calls become failed outcomes.
#[derive(Clone)]
pub struct NodeRpcClient {
    http_client: reqwest::Client,
    endpoint: String,
    credentials: Option<NodeRpcCredentials>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl NodeRpcClient {
    /// Creates a client for one RPC endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: impl Into<String>,
        credentials: Option<NodeRpcCredentials>,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            credentials,
        }
    }

    async fn call(&self, method: &str, params: Value) -> AppResult<Value> {
        let mut request = self
            .http_client
            .post(self.endpoint.as_str())
            .json(&rpc_request_body(method, params));
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.user, credentials.password.as_ref());
        }

        let response = request.send().await.map_err(|error| {
            AppError::Internal(format!("node RPC '{method}' transport error: {error}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to read node RPC '{method}' response: {error}"
            ))
        })?;

        debug!(method, status = status.as_u16(), "node RPC call finished");
        parse_rpc_response(method, status, body.as_str())
    }
}

#[async_trait]
impl PeerSource for NodeRpcClient {
    async fn list_peers(&self) -> AppResult<Vec<Peer>> {
        let Value::Array(entries) = self.call("getpeerinfo", json!([])).await? else {
            return Err(AppError::Internal(
                "node RPC 'getpeerinfo' did not return an array".to_owned(),
            ));
        };

        entries.into_iter().map(Peer::from_value).collect()
    }
}

#[async_trait]
impl PeerControl for NodeRpcClient {
    async fn ban(&self, address: &str, duration_seconds: u64) -> AppResult<ActionOutcome> {
        let target = ban_target(address);

        match self
            .call("setban", json!([target, "add", duration_seconds]))
            .await
        {
            Ok(_) => Ok(ActionOutcome::succeeded(format!(
                "Banned {target} for {duration_seconds} seconds"
            ))),
            Err(error) => Ok(ActionOutcome::failed(error.to_string())),
        }
    }

    async fn disconnect(&self, peer_id: &str) -> AppResult<ActionOutcome> {
        let Ok(node_id) = peer_id.trim().parse::<i64>() else {
            return Ok(ActionOutcome::failed(format!(
                "peer id '{peer_id}' is not a node id"
            )));
        };

        match self.call("disconnectnode", json!(["", node_id])).await {
            Ok(_) => Ok(ActionOutcome::succeeded(format!(
                "Disconnected peer {node_id}"
            ))),
            Err(error) => Ok(ActionOutcome::failed(error.to_string())),
        }
    }
}

fn rpc_request_body(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "1.0",
        "id": RPC_REQUEST_ID,
        "method": method,
        "params": params,
    })
}

// The node answers RPC errors with a non-2xx status and a JSON error body.
fn parse_rpc_response(method: &str, status: reqwest::StatusCode, body: &str) -> AppResult<Value> {
    let Ok(response) = serde_json::from_str::<RpcResponse>(body) else {
        return Err(AppError::Internal(format!(
            "node RPC '{method}' failed with status {status}: {}",
            body.trim()
        )));
    };

    if let Some(error) = response.error {
        return Err(AppError::Internal(format!(
            "node RPC '{method}' error {}: {}",
            error.code, error.message
        )));
    }

    if !status.is_success() {
        return Err(AppError::Internal(format!(
            "node RPC '{method}' failed with status {status}"
        )));
    }

    Ok(response.result)
}

/// Strips the port and IPv6 brackets from a peer address for `setban`.
fn ban_target(address: &str) -> &str {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }

    match address.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => address,
    }
}
