//! redb table definitions for the Beacon state store.

use redb::TableDefinition;

/// Service records keyed by service id.
pub const SERVICES: TableDefinition<u64, &[u8]> = TableDefinition::new("services");

/// Changelog entries keyed by a monotonically increasing entry id.
pub const CHANGELOG: TableDefinition<u64, &[u8]> = TableDefinition::new("changelog");

/// Last id handed out per sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const SERVICE_SEQUENCE: &str = "services";
pub const CHANGELOG_SEQUENCE: &str = "changelog";
