use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;

use super::{KeyValueBackend, StorageError};

/// Redis-over-HTTP key-value service (`/get/<key>`, `/set/<key>`, `/del/<key>`).
///
/// Values travel as JSON text in the request body and come back as a string
/// in the `result` field of the reply.
#[derive(Debug, Clone)]
pub struct RestKvBackend {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<Value>,
}

impl RestKvBackend {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, command: &str, key: &str) -> String {
        format!("{}/{command}/{}", self.base_url, encode_segment(key))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        key: &str,
    ) -> Result<KvReply, StorageError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<KvReply>().await?)
    }
}

fn encode_segment(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~' | b':') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[async_trait]
impl KeyValueBackend for RestKvBackend {
    fn name(&self) -> &'static str {
        "rest-kv"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let reply = self.send(self.client.get(self.url("get", key)), key).await?;
        match reply.result {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StorageError::Malformed {
                    key: key.to_string(),
                    source,
                }),
            // Some services decode JSON values on their side.
            Some(other) => Ok(Some(other)),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let body = serde_json::to_string(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.send(self.client.post(self.url("set", key)).body(body), key)
            .await
            .map(|_| ())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.send(self.client.post(self.url("del", key)), key)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_escape_keys_and_trim_slashes() {
        let backend = RestKvBackend::new(Client::new(), "https://kv.example.com/", "t");
        assert_eq!(
            backend.url("get", "session:a b/c"),
            "https://kv.example.com/get/session:a%20b%2Fc"
        );
        assert_eq!(
            backend.url("set", "surveyConfig"),
            "https://kv.example.com/set/surveyConfig"
        );
    }

    #[test]
    fn replies_tolerate_missing_result() {
        let reply: KvReply = serde_json::from_str(r#"{"error": null}"#).unwrap();
        assert!(reply.result.is_none());
        let reply: KvReply = serde_json::from_str(r#"{"result": "{\"a\":1}"}"#).unwrap();
        assert_eq!(reply.result, Some(Value::String(r#"{"a":1}"#.into())));
    }
}
