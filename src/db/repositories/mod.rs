pub mod connection;
pub mod follow;
pub mod post;
pub mod user;
pub mod verification;
