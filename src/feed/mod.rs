pub mod coordinator;
pub mod cursor;
pub mod visibility;

pub use coordinator::{FeedCollaborators, FeedCommand, FeedCoordinator, FeedHandle, FeedSnapshot};
pub use cursor::FeedCursor;
pub use visibility::{PreloadWindow, VisibilityGate};
