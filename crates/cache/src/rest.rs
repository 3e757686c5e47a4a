//! Networked backend speaking the Upstash-compatible Redis REST protocol.
//!
//! Each command is a JSON array POSTed to the base URL with a bearer token;
//! the reply is `{"result": ...}` or `{"error": "..."}`. Values are stored as
//! JSON text and parsed back on read.

use async_trait::async_trait;
use gatherline_core::CacheBackend;
use gatherline_core::error::CacheError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::trace;

/// Per-command HTTP timeout. Cache I/O must stay well inside source deadlines.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RestBackend {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| CacheError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// POST a JSON body to `path` under the base URL and return the reply.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, CacheError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let status = response.status();
        let reply: Value = response
            .json()
            .await
            .map_err(|e| CacheError::Serialization(format!("unreadable reply ({status}): {e}")))?;

        if let Some(error) = reply.get("error").and_then(Value::as_str) {
            return Err(CacheError::Command(error.to_string()));
        }
        if !status.is_success() {
            return Err(CacheError::Command(format!("HTTP {status}")));
        }
        Ok(reply)
    }

    /// Run one command and return its `result`.
    async fn command(&self, args: Value) -> Result<Value, CacheError> {
        trace!(command = %args[0], "Cache REST command");
        let reply: RestReply = serde_json::from_value(self.post("", &args).await?)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(reply.result)
    }

    /// Run several commands as one MULTI/EXEC transaction and return each
    /// command's `result` in order.
    async fn transaction(&self, commands: Value) -> Result<Vec<Value>, CacheError> {
        trace!(commands = %commands, "Cache REST transaction");
        let replies: Vec<RestReply> = serde_json::from_value(self.post("/multi-exec", &commands).await?)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        replies
            .into_iter()
            .map(|reply| match reply.error {
                Some(error) => Err(CacheError::Command(error)),
                None => Ok(reply.result),
            })
            .collect()
    }

    fn encode(value: &Value) -> Result<String, CacheError> {
        serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

/// Turn a raw reply string back into the stored JSON value. Text that is not
/// JSON (written by another client) is returned as a plain string.
fn decode_reply(result: Value) -> Option<Value> {
    match result {
        Value::Null => None,
        Value::String(raw) => Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
        other => Some(other),
    }
}

/// Whole seconds for `EX`/`EXPIRE`, rounded up so an entry never expires
/// earlier than asked.
fn ttl_secs(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis().div_ceil(1000))
        .unwrap_or(u64::MAX)
        .max(1)
}

#[async_trait]
impl CacheBackend for RestBackend {
    fn name(&self) -> &str {
        "rest"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let result = self.command(json!(["GET", key])).await?;
        Ok(decode_reply(result))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let encoded = Self::encode(&value)?;
        let args = match ttl {
            Some(ttl) => json!(["SET", key, encoded, "EX", ttl_secs(ttl)]),
            None => json!(["SET", key, encoded]),
        };
        self.command(args).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        let encoded = Self::encode(&value)?;
        let result = self
            .command(json!(["SET", key, encoded, "NX", "EX", ttl_secs(ttl)]))
            .await?;
        Ok(!result.is_null())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        // EXPIRE NX only sets a TTL the counter lacks, so the window starts at
        // the first increment and a counter can never be left without one.
        let results = self
            .transaction(json!([["INCR", key], ["EXPIRE", key, ttl_secs(ttl), "NX"]]))
            .await?;
        results
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| CacheError::Command(format!("INCR on '{key}' returned a non-integer")))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let result = self.command(json!(["EXISTS", key])).await?;
        Ok(result.as_i64().unwrap_or(0) > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.command(json!(["DEL", key])).await?;
        Ok(())
    }
}
