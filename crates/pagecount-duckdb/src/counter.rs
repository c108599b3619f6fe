use anyhow::Result;
use async_trait::async_trait;

use pagecount_core::{
    counter::{CounterDelta, CounterStore},
    error::CoreError,
};

use crate::DuckDbBackend;

#[async_trait]
impl CounterStore for DuckDbBackend {
    /// One `UPDATE ... SET pv = pv + ?, uv = uv + ?` on the post's row.
    ///
    /// Errors with [`CoreError::ResourceNotFound`] when no row matched.
    async fn atomic_increment(&self, resource_id: i64, delta: CounterDelta) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE posts SET pv = pv + ?1, uv = uv + ?2 WHERE id = ?3",
            duckdb::params![delta.pv, delta.uv, resource_id],
        )?;
        if updated == 0 {
            return Err(CoreError::ResourceNotFound(resource_id).into());
        }
        Ok(())
    }
}
