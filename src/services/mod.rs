pub mod auth;
pub mod rewards;
pub mod withdrawals;

pub use auth::{AuthService, Credentials, validate_credentials};
pub use rewards::{RewardOutcome, RewardService};
pub use withdrawals::{WithdrawalQuote, WithdrawalService};
