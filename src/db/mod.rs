use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::connection::Connection;
pub use repositories::post::Post;
pub use repositories::user::User;
pub use repositories::verification::VerificationRequest;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn connection_repo(&self) -> repositories::connection::ConnectionRepository {
        repositories::connection::ConnectionRepository::new(self.conn.clone())
    }

    fn follow_repo(&self) -> repositories::follow::FollowRepository {
        repositories::follow::FollowRepository::new(self.conn.clone())
    }

    fn verification_repo(&self) -> repositories::verification::VerificationRepository {
        repositories::verification::VerificationRepository::new(self.conn.clone())
    }

    fn post_repo(&self) -> repositories::post::PostRepository {
        repositories::post::PostRepository::new(self.conn.clone())
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password: &str,
        config: Option<&SecurityConfig>,
    ) -> Result<User> {
        self.user_repo()
            .create(email, username, password, config)
            .await
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn mark_user_verified(&self, id: i32) -> Result<()> {
        self.user_repo().mark_verified(id).await
    }

    // ---- connections ----

    pub async fn create_connection(
        &self,
        user_id: i32,
        provider: &str,
        access_token: &str,
        refresh_token: &str,
        provider_user_id: &str,
    ) -> Result<Connection> {
        self.connection_repo()
            .create(user_id, provider, access_token, refresh_token, provider_user_id)
            .await
    }

    pub async fn get_connection(&self, user_id: i32, provider: &str) -> Result<Option<Connection>> {
        self.connection_repo().get_for_user(user_id, provider).await
    }

    pub async fn find_connection_by_provider_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<Connection>> {
        self.connection_repo()
            .find_by_provider_account(provider, provider_user_id)
            .await
    }

    pub async fn connection_exists_for_other_user(
        &self,
        provider: &str,
        provider_user_id: &str,
        exclude_user_id: i32,
    ) -> Result<bool> {
        self.connection_repo()
            .exists_for_other_user(provider, provider_user_id, exclude_user_id)
            .await
    }

    pub async fn update_connection_tokens(
        &self,
        id: i32,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<()> {
        self.connection_repo()
            .update_tokens(id, access_token, refresh_token)
            .await
    }

    pub async fn delete_connection(&self, user_id: i32, provider: &str) -> Result<bool> {
        self.connection_repo()
            .delete_for_user(user_id, provider)
            .await
    }

    // ---- follows ----

    pub async fn follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        self.follow_repo().follow(follower_id, followed_id).await
    }

    pub async fn unfollow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        self.follow_repo().unfollow(follower_id, followed_id).await
    }

    pub async fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        self.follow_repo()
            .is_following(follower_id, followed_id)
            .await
    }

    pub async fn count_followers(&self, user_id: i32) -> Result<u64> {
        self.follow_repo().count_followers(user_id).await
    }

    pub async fn count_following(&self, user_id: i32) -> Result<u64> {
        self.follow_repo().count_following(user_id).await
    }

    // ---- email verification ----

    pub async fn create_verification_request(&self, user_id: i32) -> Result<VerificationRequest> {
        self.verification_repo().create(user_id).await
    }

    pub async fn latest_verification_request(
        &self,
        user_id: i32,
    ) -> Result<Option<VerificationRequest>> {
        self.verification_repo().latest_for_user(user_id).await
    }

    pub async fn invalidate_verification_requests(&self, user_id: i32) -> Result<()> {
        self.verification_repo().invalidate_for_user(user_id).await
    }

    // ---- posts ----

    pub async fn create_post(&self, user_id: i32, resource_uri: &str, content: &str) -> Result<Post> {
        self.post_repo().create(user_id, resource_uri, content).await
    }

    pub async fn list_posts_for_user(&self, user_id: i32) -> Result<Vec<Post>> {
        self.post_repo().list_for_user(user_id).await
    }
}
