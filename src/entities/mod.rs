pub mod prelude;

pub mod connections;
pub mod email_verification_requests;
pub mod follows;
pub mod posts;
pub mod resources;
pub mod users;
