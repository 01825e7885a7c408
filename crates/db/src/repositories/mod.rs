//! Database repositories.
//!
//! Each repository implements one `locus-core` store trait for a single
//! partition on top of any `SeaORM` connection, usually an open transaction.

pub mod location;
pub mod location_type;

pub use location::PgLocationStore;
pub use location_type::PgTypeStore;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;

/// Rows per statement when the caller does not configure it.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

pub(crate) fn to_db_time(ts: DateTime<Utc>) -> DateTimeWithTimeZone {
    ts.fixed_offset()
}

pub(crate) fn from_db_time(ts: DateTimeWithTimeZone) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

/// Escapes `LIKE` wildcards so user input matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("center"), "center");
    }

    #[test]
    fn test_time_roundtrip() {
        let now = Utc::now();
        assert_eq!(from_db_time(to_db_time(now)), now);
    }
}
