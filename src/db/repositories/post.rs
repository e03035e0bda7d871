use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{posts, resources};

/// A user-authored annotation attached to a provider resource.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i32,
    pub user_id: i32,
    pub resource_uri: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PostRepository {
    conn: DatabaseConnection,
}

impl PostRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a post, reusing the resource row when the URI is already known.
    pub async fn create(&self, user_id: i32, resource_uri: &str, content: &str) -> Result<Post> {
        let resource_id = self.get_or_create_resource(resource_uri).await?;
        let now = chrono::Utc::now().to_rfc3339();

        let active = posts::ActiveModel {
            user_id: Set(user_id),
            resource_id: Set(resource_id),
            content: Set(content.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert post")?;

        Ok(Post {
            id: model.id,
            user_id: model.user_id,
            resource_uri: resource_uri.to_string(),
            content: model.content,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<Post>> {
        let rows = posts::Entity::find()
            .filter(posts::Column::UserId.eq(user_id))
            .order_by_desc(posts::Column::CreatedAt)
            .find_also_related(resources::Entity)
            .all(&self.conn)
            .await
            .context("Failed to query posts")?;

        Ok(rows
            .into_iter()
            .map(|(post, resource)| Post {
                id: post.id,
                user_id: post.user_id,
                resource_uri: resource.map(|r| r.uri).unwrap_or_default(),
                content: post.content,
                created_at: post.created_at,
                updated_at: post.updated_at,
            })
            .collect())
    }

    async fn get_or_create_resource(&self, uri: &str) -> Result<i32> {
        let existing = resources::Entity::find()
            .filter(resources::Column::Uri.eq(uri))
            .one(&self.conn)
            .await
            .context("Failed to query resource")?;

        if let Some(resource) = existing {
            return Ok(resource.id);
        }

        let active = resources::ActiveModel {
            uri: Set(uri.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert resource")?;

        Ok(model.id)
    }
}
