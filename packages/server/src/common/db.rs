//! Database pool construction and SQL helpers.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Maximum number of values bound into a single `IN (...)` list.
///
/// Postgres caps bind parameters at 65535 per statement; callers that pass
/// larger id sets iterate [`in_chunks`] and issue one statement per chunk.
pub const MAX_IN_PARAMS: usize = 10_000;

/// Connect a pool with the standard options.
pub async fn connect_pool(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("Failed to connect to database")
}

/// Split a slice into `IN`-list sized chunks.
pub fn in_chunks<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(MAX_IN_PARAMS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sets_are_one_chunk() {
        let ids: Vec<i64> = (0..100).collect();
        assert_eq!(in_chunks(&ids).count(), 1);
    }

    #[test]
    fn large_sets_split_at_the_limit() {
        let ids: Vec<i64> = (0..(MAX_IN_PARAMS as i64 * 2 + 1)).collect();
        let chunks: Vec<_> = in_chunks(&ids).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_IN_PARAMS);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn empty_set_has_no_chunks() {
        let ids: Vec<i64> = Vec::new();
        assert_eq!(in_chunks(&ids).count(), 0);
    }
}
