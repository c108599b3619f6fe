/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `PAGECOUNT_DUCKDB_MEMORY`, default `"1GB"`).
///
/// IMPORTANT:
///   - Always set an explicit memory limit. The DuckDB default (80% of
///     system RAM) is not acceptable for a server process.
///   - `pv` / `uv` are only ever written by `pv = pv + ?` style updates.
///     Never read them into Rust and write them back.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- POSTS (countable resources)
-- ===========================================
CREATE TABLE IF NOT EXISTS posts (
    id              BIGINT PRIMARY KEY,            -- allocated by create_post or given by seed_post
    title           VARCHAR NOT NULL,
    pv              BIGINT NOT NULL DEFAULT 0,     -- page views, deduplicated per visitor per short window
    uv              BIGINT NOT NULL DEFAULT 0,     -- unique visitors, deduplicated per visitor per day
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#
    )
}
