pub mod connector;
pub mod error;
pub mod id;
pub mod marker;
pub mod placeholder;

pub use connector::{Connector, EmbeddedFunction, RemoteFunctionConfig};
pub use error::{CoreError, Result};
pub use id::{CONNECTOR_ID_LEN, IdError, generate_connector_id, validate_id};
pub use marker::Marker;
pub use placeholder::{PSQL_HOST, PlaceholderTable};
