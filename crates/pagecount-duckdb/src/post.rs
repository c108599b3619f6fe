use anyhow::Result;
use serde::Serialize;

use pagecount_core::counter::ContentCounters;

use crate::DuckDbBackend;

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub pv: i64,
    pub uv: i64,
    pub created_at: String,
}

impl Post {
    pub fn counters(&self) -> ContentCounters {
        ContentCounters {
            pv: self.pv,
            uv: self.uv,
        }
    }
}

const POST_COLUMNS: &str = "id, title, pv, uv, CAST(created_at AS VARCHAR)";

fn post_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        pv: row.get(2)?,
        uv: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl DuckDbBackend {
    /// Create a post with zeroed counters and return it.
    ///
    /// The id is one past the largest stored id, so posts inserted with an
    /// explicit id by [`seed_post`](Self::seed_post) are never reissued.
    /// Allocation and insert run under the connection lock.
    pub async fn create_post(&self, title: &str) -> Result<Post> {
        let conn = self.conn.lock().await;
        let id: i64 = conn
            .prepare(
                "INSERT INTO posts (id, title) \
                 VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM posts), ?1) \
                 RETURNING id",
            )?
            .query_row(duckdb::params![title], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
        let post = stmt.query_row(duckdb::params![id], post_from_row)?;
        Ok(post)
    }

    /// Insert a post with a fixed id if it does not exist yet.
    ///
    /// Intended for fixtures and startup seeding. Safe to call repeatedly;
    /// existing counters are left untouched.
    pub async fn seed_post(&self, id: i64, title: &str) -> Result<()> {
        self.seed_posts(&[(id, title.to_string())]).await?;
        Ok(())
    }

    /// Seed every `(id, title)` pair. Returns how many posts were new.
    pub async fn seed_posts(&self, posts: &[(i64, String)]) -> Result<usize> {
        let conn = self.conn.lock().await;
        let mut inserted = 0;
        for (id, title) in posts {
            inserted += conn.execute(
                "INSERT INTO posts (id, title) VALUES (?1, ?2) ON CONFLICT (id) DO NOTHING",
                duckdb::params![id, title],
            )?;
        }
        Ok(inserted)
    }

    pub async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
        let mut rows = stmt.query_map(duckdb::params![id], post_from_row)?;
        match rows.next() {
            Some(post) => Ok(Some(post?)),
            None => Ok(None),
        }
    }

    pub async fn get_counters(&self, id: i64) -> Result<Option<ContentCounters>> {
        Ok(self.get_post(id).await?.map(|p| p.counters()))
    }
}
