pub mod local;
pub mod memory;
pub mod meta;
pub mod supabase;
pub mod traits;

// Re-export commonly used types
pub use local::LocalCatalog;
pub use memory::{LocalAuth, MemoryStore};
pub use meta::MetaAdLibrary;
pub use supabase::{SupabaseApi, SupabaseAuth, SupabaseBackend};
pub use traits::{AdSource, AuthProvider, StatsStore, WithdrawalStore};
