use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::connections;

/// A stored OAuth credential pair linking one local user to one provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: i32,
    pub user_id: i32,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub provider_user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<connections::Model> for Connection {
    fn from(model: connections::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            provider: model.provider,
            access_token: model.access_token,
            refresh_token: model.refresh_token,
            provider_user_id: model.provider_user_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct ConnectionRepository {
    conn: DatabaseConnection,
}

impl ConnectionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: i32,
        provider: &str,
        access_token: &str,
        refresh_token: &str,
        provider_user_id: &str,
    ) -> Result<Connection> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = connections::ActiveModel {
            user_id: Set(user_id),
            provider: Set(provider.to_string()),
            access_token: Set(access_token.to_string()),
            refresh_token: Set(refresh_token.to_string()),
            provider_user_id: Set(provider_user_id.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert connection")?;

        Ok(Connection::from(model))
    }

    pub async fn get_for_user(&self, user_id: i32, provider: &str) -> Result<Option<Connection>> {
        let connection = connections::Entity::find()
            .filter(connections::Column::UserId.eq(user_id))
            .filter(connections::Column::Provider.eq(provider))
            .one(&self.conn)
            .await
            .context("Failed to query connection by user")?;

        Ok(connection.map(Connection::from))
    }

    pub async fn find_by_provider_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<Connection>> {
        let connection = connections::Entity::find()
            .filter(connections::Column::Provider.eq(provider))
            .filter(connections::Column::ProviderUserId.eq(provider_user_id))
            .one(&self.conn)
            .await
            .context("Failed to query connection by provider account")?;

        Ok(connection.map(Connection::from))
    }

    /// True if the remote account is already linked to a different local user.
    pub async fn exists_for_other_user(
        &self,
        provider: &str,
        provider_user_id: &str,
        exclude_user_id: i32,
    ) -> Result<bool> {
        let connection = connections::Entity::find()
            .filter(connections::Column::Provider.eq(provider))
            .filter(connections::Column::ProviderUserId.eq(provider_user_id))
            .filter(connections::Column::UserId.ne(exclude_user_id))
            .one(&self.conn)
            .await
            .context("Failed to query connection ownership")?;

        Ok(connection.is_some())
    }

    /// Overwrite both token fields in place. Every write path sets updated_at.
    pub async fn update_tokens(
        &self,
        id: i32,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<()> {
        let connection = connections::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query connection for token update")?
            .ok_or_else(|| anyhow::anyhow!("Connection not found: {id}"))?;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: connections::ActiveModel = connection.into();
        active.access_token = Set(access_token.to_string());
        active.refresh_token = Set(refresh_token.to_string());
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Delete the user's connection for a provider; returns whether a row existed.
    pub async fn delete_for_user(&self, user_id: i32, provider: &str) -> Result<bool> {
        let result = connections::Entity::delete_many()
            .filter(connections::Column::UserId.eq(user_id))
            .filter(connections::Column::Provider.eq(provider))
            .exec(&self.conn)
            .await
            .context("Failed to delete connection")?;

        Ok(result.rows_affected > 0)
    }
}
