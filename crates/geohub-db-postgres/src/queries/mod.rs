//! SQL for the `connectors` table.

pub mod connectors;
