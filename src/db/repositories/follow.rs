use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, SqlErr,
};
use tracing::debug;

use crate::entities::follows;

pub struct FollowRepository {
    conn: DatabaseConnection,
}

impl FollowRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create the edge unless it already exists. Returns whether a new edge was
    /// inserted. Two concurrent identical follows can both pass the existence
    /// check; the unique index catches the loser and that is treated as a
    /// benign duplicate, not a failure.
    pub async fn follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        if self.is_following(follower_id, followed_id).await? {
            return Ok(false);
        }

        let active = follows::ActiveModel {
            followed_id: Set(followed_id),
            follower_id: Set(follower_id),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        match active.insert(&self.conn).await {
            Ok(_) => Ok(true),
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    debug!(follower_id, followed_id, "Duplicate follow lost the race");
                    return Ok(false);
                }
                Err(e).context("Failed to insert follow edge")
            }
        }
    }

    /// Delete the edge if present; no-op otherwise. Returns whether an edge
    /// was removed.
    pub async fn unfollow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let result = follows::Entity::delete_many()
            .filter(follows::Column::FollowerId.eq(follower_id))
            .filter(follows::Column::FollowedId.eq(followed_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete follow edge")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let edge = follows::Entity::find()
            .filter(follows::Column::FollowerId.eq(follower_id))
            .filter(follows::Column::FollowedId.eq(followed_id))
            .one(&self.conn)
            .await
            .context("Failed to query follow edge")?;

        Ok(edge.is_some())
    }

    pub async fn count_followers(&self, user_id: i32) -> Result<u64> {
        follows::Entity::find()
            .filter(follows::Column::FollowedId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count followers")
    }

    pub async fn count_following(&self, user_id: i32) -> Result<u64> {
        follows::Entity::find()
            .filter(follows::Column::FollowerId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count following")
    }
}
