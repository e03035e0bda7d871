pub use super::connections::Entity as Connections;
pub use super::email_verification_requests::Entity as EmailVerificationRequests;
pub use super::follows::Entity as Follows;
pub use super::posts::Entity as Posts;
pub use super::resources::Entity as Resources;
pub use super::users::Entity as Users;
