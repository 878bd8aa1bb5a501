//! Collaborators the migration auditor reads from: the `solido` CLI and
//! saved dumps of its JSON output.

pub mod fixtures;
pub mod snapshot;
pub mod solido_cli;

pub use fixtures::FixtureDir;
pub use snapshot::{decode_show_solido, decode_show_transaction};
pub use solido_cli::SolidoCli;
