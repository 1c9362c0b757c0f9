//! # CyclingMarket
//!
//! `cyclingmarket` is a marketplace listing API. Every request is admitted by a
//! per-client token bucket, identified by an opaque bearer token and checked
//! against the caller's permission codes before it reaches a handler.
//!
//! ## Listings
//!
//! Ads carry a `version` counter. Updates are compare-and-swap on that counter,
//! so two writers racing on the same ad never silently overwrite each other:
//! the loser receives `409 Conflict` and must re-read.
//!
//! ## Accounts
//!
//! Registration stores an argon2 password hash, grants `ads:read` and mails an
//! activation token. Only activated accounts holding `ads:write` may create,
//! edit or delete listings.
//!
//! The `PostgreSQL` schema lives in `db/sql/01_cyclingmarket.sql`.

pub mod api;
pub mod cli;

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result, ensure};
    use std::fs;
    use std::path::PathBuf;

    fn canonicalize_sql(sql: &str) -> String {
        sql.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect()
    }

    fn schema() -> Result<String> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("db/sql/01_cyclingmarket.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        Ok(canonicalize_sql(&sql))
    }

    #[test]
    fn schema_creates_every_table() -> Result<()> {
        let canonical = schema()?;
        for table in ["users", "tokens", "permissions", "users_permissions", "ads"] {
            ensure!(
                canonical.contains(&format!("createtableifnotexists{table}(")),
                "table {table} is missing from the schema"
            );
        }
        Ok(())
    }

    #[test]
    fn schema_seeds_permission_codes() -> Result<()> {
        let canonical = schema()?;
        ensure!(
            canonical.contains("values('ads:read'),('ads:write')"),
            "permission codes are not seeded"
        );
        Ok(())
    }
}
