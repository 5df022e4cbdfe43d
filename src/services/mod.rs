// Service exports
pub mod billing;
pub mod memory;
pub mod postgres;
pub mod store;

pub use billing::{BillingClient, BillingError, StaticEntitlements, SubscriptionService};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::{Store, StoreError};
