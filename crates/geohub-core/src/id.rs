// Connector ID handling
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;

/// Length of generated connector IDs.
pub const CONNECTOR_ID_LEN: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("connector ID must not be empty")]
    Empty,
}

/// Generates a random connector ID of [`CONNECTOR_ID_LEN`] characters drawn
/// uniformly from `[A-Za-z0-9]`.
pub fn generate_connector_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONNECTOR_ID_LEN)
        .map(char::from)
        .collect()
}

/// IDs are opaque; only the empty string is rejected.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    Ok(())
}
