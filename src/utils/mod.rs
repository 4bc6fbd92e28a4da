pub mod errors;

pub use errors::{AppError, PlaybackError, TransitionError, WithdrawalError};
