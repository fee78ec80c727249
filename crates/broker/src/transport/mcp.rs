// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /mcp`: JSON-RPC 2.0 tool endpoint over the credential broker.
//!
//! Tool failures are returned as tool results with `isError: true` and the
//! translated message; JSON-RPC errors are reserved for protocol problems.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::ServiceKind;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::translate::translate;

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// `None` only when the member is absent. `"id": null` is `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    fn from_outcome(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self { jsonrpc: "2.0", id, result: Some(result), error: None },
            Err(error) => Self { jsonrpc: "2.0", id, result: None, error: Some(error) },
        }
    }
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError { code, message: message.into() }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct AccountArgs {
    account: String,
}

#[derive(Debug, Deserialize)]
struct ApiRequestArgs {
    account: String,
    service: String,
    #[serde(default = "default_method")]
    method: String,
    path: String,
    #[serde(default)]
    body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_owned()
}

/// `POST /mcp`
pub async fn mcp(State(s): State<Arc<AppState>>, body: String) -> Response {
    let req: RpcRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            let err = rpc_error(PARSE_ERROR, e.to_string());
            return Json(RpcResponse::from_outcome(Value::Null, Err(err))).into_response();
        }
    };
    // Notifications omit the id member and get no response body.
    let Some(id) = req.id else {
        return StatusCode::ACCEPTED.into_response();
    };
    if req.jsonrpc != "2.0" {
        let err = rpc_error(INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        return Json(RpcResponse::from_outcome(id, Err(err))).into_response();
    }

    let outcome = match req.method.as_str() {
        "initialize" => Ok(initialize_result()),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => tools_call(&s, req.params).await,
        other => Err(rpc_error(METHOD_NOT_FOUND, format!("method not found: {other}"))),
    };
    Json(RpcResponse::from_outcome(id, outcome)).into_response()
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": "credbroker", "version": env!("CARGO_PKG_VERSION") },
    })
}

fn tool_definitions() -> Value {
    let services: Vec<&str> = ServiceKind::ALL.iter().map(ServiceKind::as_str).collect();
    json!([
        {
            "name": "list_accounts",
            "description": "List configured accounts and how each one authenticates.",
            "inputSchema": { "type": "object", "properties": {} },
        },
        {
            "name": "get_profile",
            "description": "Fetch the mail profile of an account (verifies its credential).",
            "inputSchema": {
                "type": "object",
                "properties": { "account": { "type": "string" } },
                "required": ["account"],
            },
        },
        {
            "name": "api_request",
            "description": "Send an authenticated request to one service on behalf of an account.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "account": { "type": "string" },
                    "service": { "type": "string", "enum": services },
                    "method": { "type": "string", "default": "GET" },
                    "path": { "type": "string", "description": "Path relative to the service base URL." },
                    "body": { "type": "object" },
                },
                "required": ["account", "service", "path"],
            },
        },
    ])
}

async fn tools_call(s: &AppState, params: Value) -> Result<Value, RpcError> {
    let call: CallToolParams = serde_json::from_value(params)
        .map_err(|e| rpc_error(INVALID_PARAMS, format!("invalid tools/call params: {e}")))?;

    let result = match call.name.as_str() {
        "list_accounts" => Ok(list_accounts(s)),
        "get_profile" => match parse_args::<AccountArgs>(call.arguments) {
            Ok(args) => get_profile(s, &args.account).await,
            Err(msg) => return Ok(tool_text_error(&msg)),
        },
        "api_request" => match parse_args::<ApiRequestArgs>(call.arguments) {
            Ok(args) => match api_request(s, args).await {
                Ok(value) => Ok(value),
                Err(ToolFailure::Arguments(msg)) => return Ok(tool_text_error(&msg)),
                Err(ToolFailure::Broker(e)) => Err(e),
            },
            Err(msg) => return Ok(tool_text_error(&msg)),
        },
        other => return Err(rpc_error(INVALID_PARAMS, format!("unknown tool: {other}"))),
    };

    Ok(match result {
        Ok(value) => tool_success(&value),
        Err(e) => {
            tracing::warn!(tool = %call.name, kind = %e.kind(), err = %e, "tool call failed");
            tool_broker_error(&e)
        }
    })
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, String> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))
}

fn list_accounts(s: &AppState) -> Value {
    let registry = s.broker.registry();
    let accounts: Vec<Value> = s
        .broker
        .configured_accounts()
        .into_iter()
        .map(|account| {
            let strategy = registry.classify(&account).ok();
            json!({ "account": account, "strategy": strategy })
        })
        .collect();
    json!({ "accounts": accounts })
}

async fn get_profile(s: &AppState, account: &str) -> Result<Value, BrokerError> {
    let client = s.broker.client(account, ServiceKind::Mail)?;
    client.get_json("users/me/profile").await
}

enum ToolFailure {
    Arguments(String),
    Broker(BrokerError),
}

impl From<BrokerError> for ToolFailure {
    fn from(e: BrokerError) -> Self {
        Self::Broker(e)
    }
}

async fn api_request(s: &AppState, args: ApiRequestArgs) -> Result<Value, ToolFailure> {
    let kind: ServiceKind =
        args.service.parse().map_err(|e: anyhow::Error| ToolFailure::Arguments(e.to_string()))?;
    let method = reqwest::Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| ToolFailure::Arguments(format!("invalid method: {}", args.method)))?;
    let client = s.broker.client(&args.account, kind)?;
    Ok(client.request_json(method, &args.path, args.body.as_ref()).await?)
}

fn tool_success(value: &Value) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    json!({ "content": [{ "type": "text", "text": text }], "isError": false })
}

fn tool_broker_error(err: &BrokerError) -> Value {
    json!({
        "content": [{ "type": "text", "text": translate(err) }],
        "isError": true,
        "errorKind": err.kind(),
    })
}

fn tool_text_error(message: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": message }], "isError": true })
}
