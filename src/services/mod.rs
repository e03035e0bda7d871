pub mod token_refresh;
pub use token_refresh::TokenRefreshObserver;

pub mod verification;
pub use verification::{EmailVerifier, LogMailer, Mailer, VerificationError};
