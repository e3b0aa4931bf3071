//! `${NAME}` placeholder substitution for embedded connector environments.

use std::collections::BTreeMap;

use crate::connector::Connector;

/// Placeholder resolved to the configured PostgreSQL host.
pub const PSQL_HOST: &str = "PSQL_HOST";

/// Host-level replacement values keyed by placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderTable {
    values: BTreeMap<String, String>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every env value of the form `${NAME}` whose `NAME` is known.
    ///
    /// Single pass: a replacement that itself looks like a placeholder is not
    /// resolved again. Connectors without an embedded function are left alone.
    /// Returns the number of values replaced.
    pub fn resolve(&self, connector: &mut Connector) -> usize {
        let Some(embedded) = connector.embedded_mut() else {
            return 0;
        };

        let mut replaced = 0;
        for value in embedded.env.values_mut() {
            if let Some(replacement) = placeholder_name(value).and_then(|name| self.get(name)) {
                *value = replacement.to_string();
                replaced += 1;
            }
        }
        replaced
    }
}

/// Extracts `NAME` from a value shaped like `${NAME}`.
///
/// The name ends at the first `}` after the opening `${`.
fn placeholder_name(value: &str) -> Option<&str> {
    if !(value.starts_with("${") && value.ends_with('}')) {
        return None;
    }
    let inner = &value[2..];
    inner.find('}').map(|end| &inner[..end])
}
