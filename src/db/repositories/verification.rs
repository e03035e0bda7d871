use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::email_verification_requests as requests;

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub id: i32,
    pub user_id: i32,
    pub is_valid: bool,
    pub requested_at: String,
    pub updated_at: String,
}

impl From<requests::Model> for VerificationRequest {
    fn from(model: requests::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            is_valid: model.is_valid,
            requested_at: model.requested_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct VerificationRepository {
    conn: DatabaseConnection,
}

impl VerificationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, user_id: i32) -> Result<VerificationRequest> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = requests::ActiveModel {
            user_id: Set(user_id),
            is_valid: Set(true),
            requested_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert verification request")?;

        Ok(VerificationRequest::from(model))
    }

    /// The most recent request governs the resend cooldown.
    pub async fn latest_for_user(&self, user_id: i32) -> Result<Option<VerificationRequest>> {
        let request = requests::Entity::find()
            .filter(requests::Column::UserId.eq(user_id))
            .order_by_desc(requests::Column::RequestedAt)
            .order_by_desc(requests::Column::Id)
            .one(&self.conn)
            .await
            .context("Failed to query latest verification request")?;

        Ok(request.map(VerificationRequest::from))
    }

    pub async fn invalidate_for_user(&self, user_id: i32) -> Result<()> {
        let open = requests::Entity::find()
            .filter(requests::Column::UserId.eq(user_id))
            .filter(requests::Column::IsValid.eq(true))
            .all(&self.conn)
            .await
            .context("Failed to query open verification requests")?;

        let now = chrono::Utc::now().to_rfc3339();

        for request in open {
            let mut active: requests::ActiveModel = request.into();
            active.is_valid = Set(false);
            active.updated_at = Set(now.clone());
            active.update(&self.conn).await?;
        }

        Ok(())
    }
}
