//! Connector records as persisted by the connector registry.
//!
//! Only the fields the hub interprets are typed: the `id` and the
//! `remoteFunction` variant. Everything else is kept in `extra` so that a
//! connector round-trips through the cache and the stores unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::id::{generate_connector_id, validate_id};

/// Discriminator value of the embedded remote function variant.
const EMBEDDED_TYPE: &str = "Embedded";

/// A connector configuration record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_function: Option<RemoteFunctionConfig>,

    /// Fields the hub passes through without interpreting them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Connector {
    /// Creates an empty connector with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_remote_function(mut self, remote_function: RemoteFunctionConfig) -> Self {
        self.remote_function = Some(remote_function);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the connector ID, generating a random one first if none is set.
    ///
    /// An ID that is already present is never rewritten.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_connector_id)
    }

    /// Checks that the connector can be persisted and returns its ID.
    pub fn validate(&self) -> Result<&str, CoreError> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| CoreError::invalid_id("connector has no ID"))?;
        validate_id(id).map_err(|e| CoreError::invalid_id(e.to_string()))?;
        Ok(id)
    }

    /// Returns the embedded function configuration, if this connector runs embedded.
    pub fn embedded(&self) -> Option<&EmbeddedFunction> {
        match &self.remote_function {
            Some(RemoteFunctionConfig::Embedded(embedded)) => Some(embedded),
            _ => None,
        }
    }

    pub fn embedded_mut(&mut self) -> Option<&mut EmbeddedFunction> {
        match &mut self.remote_function {
            Some(RemoteFunctionConfig::Embedded(embedded)) => Some(embedded),
            _ => None,
        }
    }

    /// Serializes the connector into its JSON document form.
    pub fn to_json(&self) -> Result<Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parses a connector from its JSON document form.
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// How the connector's storage function is run.
///
/// Serialized as a JSON object discriminated by its `type` field. Any type
/// other than `Embedded` is a remote variant the hub does not look into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum RemoteFunctionConfig {
    Embedded(EmbeddedFunction),
    /// Remote function kept as its raw object, including the `type` field.
    Remote(Map<String, Value>),
}

impl RemoteFunctionConfig {
    /// Returns the `type` discriminator.
    pub fn kind(&self) -> &str {
        match self {
            Self::Embedded(_) => EMBEDDED_TYPE,
            Self::Remote(map) => map.get("type").and_then(Value::as_str).unwrap_or_default(),
        }
    }
}

impl TryFrom<Value> for RemoteFunctionConfig {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = value else {
            return Err(CoreError::invalid_remote_function("expected a JSON object"));
        };

        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_remote_function("missing 'type' field"))?;

        if kind == EMBEDDED_TYPE {
            map.remove("type");
            let embedded: EmbeddedFunction = serde_json::from_value(Value::Object(map))?;
            Ok(Self::Embedded(embedded))
        } else {
            Ok(Self::Remote(map))
        }
    }
}

impl From<RemoteFunctionConfig> for Value {
    fn from(config: RemoteFunctionConfig) -> Self {
        match config {
            RemoteFunctionConfig::Embedded(embedded) => {
                let mut map = embedded.extra;
                let env = embedded
                    .env
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                map.insert("env".into(), Value::Object(env));
                map.insert("type".into(), Value::String(EMBEDDED_TYPE.into()));
                Value::Object(map)
            }
            RemoteFunctionConfig::Remote(map) => Value::Object(map),
        }
    }
}

/// A co-located storage function whose environment is a string map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmbeddedFunction {
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Other settings such as `className`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmbeddedFunction {
    pub fn with_env<K, V>(env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: env.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_embedded_connector_and_keeps_unknown_fields() {
        let doc = json!({
            "id": "psql",
            "owner": "ANONYMOUS",
            "remoteFunction": {
                "type": "Embedded",
                "className": "com.example.PSQLStorage",
                "env": { "PSQL_HOST": "${PSQL_HOST}" }
            }
        });

        let connector = Connector::from_json(doc.clone()).unwrap();
        assert_eq!(connector.id(), Some("psql"));
        assert_eq!(connector.extra["owner"], json!("ANONYMOUS"));

        let embedded = connector.embedded().expect("embedded variant");
        assert_eq!(embedded.env["PSQL_HOST"], "${PSQL_HOST}");
        assert_eq!(embedded.extra["className"], json!("com.example.PSQLStorage"));

        assert_eq!(connector.to_json().unwrap(), doc);
    }

    #[test]
    fn other_function_types_stay_opaque() {
        let doc = json!({
            "id": "lambda",
            "remoteFunction": { "type": "AWSLambda", "lambdaARN": "arn:aws:lambda:x" }
        });

        let connector = Connector::from_json(doc.clone()).unwrap();
        let remote = connector.remote_function.as_ref().unwrap();
        assert!(matches!(remote, RemoteFunctionConfig::Remote(_)));
        assert_eq!(remote.kind(), "AWSLambda");
        assert!(connector.embedded().is_none());
        assert_eq!(connector.to_json().unwrap(), doc);
    }

    #[test]
    fn remote_function_without_type_is_rejected() {
        let doc = json!({ "id": "x", "remoteFunction": { "env": {} } });
        assert!(Connector::from_json(doc).is_err());
    }

    #[test]
    fn ensure_id_generates_only_when_absent() {
        let mut connector = Connector::default();
        let generated = connector.ensure_id().to_string();
        assert_eq!(generated.len(), crate::CONNECTOR_ID_LEN);
        assert_eq!(connector.ensure_id(), generated);

        let mut named = Connector::new("fixed");
        assert_eq!(named.ensure_id(), "fixed");
    }

    #[test]
    fn validate_requires_non_empty_id() {
        assert!(Connector::default().validate().is_err());
        assert!(Connector::new("").validate().is_err());
        assert_eq!(Connector::new("k1").validate().unwrap(), "k1");
    }
}
