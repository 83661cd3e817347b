use std::collections::HashMap;

use uuid::Uuid;

use tether_common::types::DisplayInfo;
use tether_common::UserId;

use crate::identity::{IdentityDirectory, IdentityError, IdentityFuture};

use super::StoreClient;

impl IdentityDirectory for StoreClient {
    fn exists<'a>(&'a self, id: UserId) -> IdentityFuture<'a, bool> {
        Box::pin(async move {
            let found: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1)")
                    .bind(id.0)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| IdentityError::Backend(e.to_string()))?;
            Ok(found)
        })
    }

    fn increment_connection_count<'a>(
        &'a self,
        id: UserId,
        delta: i64,
    ) -> IdentityFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE profiles
                SET connection_count = GREATEST(connection_count + $2, 0)
                WHERE id = $1
                "#,
            )
            .bind(id.0)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Backend(e.to_string()))?;

            if result.rows_affected() == 0 {
                return Err(IdentityError::Missing(id));
            }
            Ok(())
        })
    }

    fn set_connection_count<'a>(&'a self, id: UserId, count: i64) -> IdentityFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE profiles SET connection_count = $2 WHERE id = $1")
                .bind(id.0)
                .bind(count)
                .execute(&self.pool)
                .await
                .map_err(|e| IdentityError::Backend(e.to_string()))?;

            if result.rows_affected() == 0 {
                return Err(IdentityError::Missing(id));
            }
            Ok(())
        })
    }

    fn batch_fetch_display_info<'a>(
        &'a self,
        ids: &'a [UserId],
        name_filter: Option<&'a str>,
    ) -> IdentityFuture<'a, HashMap<UserId, DisplayInfo>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(HashMap::new());
            }

            let start = std::time::Instant::now();
            let id_params: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
            let pattern = name_filter
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| format!("%{}%", escape_like(f)));

            let rows = sqlx::query_as::<_, DisplayRow>(
                r#"
                SELECT id, first_name, last_name, picture, headline
                FROM profiles
                WHERE id = ANY($1)
                  AND ($2::TEXT IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2)
                "#,
            )
            .bind(&id_params)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IdentityError::Backend(e.to_string()))?;

            metrics::histogram!("identity.display.batch.latency")
                .record(start.elapsed().as_secs_f64());

            Ok(rows
                .into_iter()
                .map(|row| {
                    let info = DisplayInfo::from(row);
                    (info.user_id, info)
                })
                .collect())
        })
    }

    fn list_identities<'a>(
        &'a self,
        after: Option<UserId>,
        limit: u32,
    ) -> IdentityFuture<'a, Vec<(UserId, i64)>> {
        Box::pin(async move {
            let rows: Vec<(Uuid, i64)> = sqlx::query_as(
                r#"
                SELECT id, connection_count
                FROM profiles
                WHERE ($1::UUID IS NULL OR id > $1)
                ORDER BY id
                LIMIT $2
                "#,
            )
            .bind(after.map(|a| a.0))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IdentityError::Backend(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|(id, count)| (UserId::from_uuid(id), count))
                .collect())
        })
    }
}

/// Escape LIKE metacharacters so a name filter is matched literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct DisplayRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    picture: Option<String>,
    headline: Option<String>,
}

impl From<DisplayRow> for DisplayInfo {
    fn from(row: DisplayRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            picture: row.picture,
            headline: row.headline,
        }
    }
}
