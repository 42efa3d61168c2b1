pub mod store;
pub mod sled_store;
pub mod memory;
pub mod cache;

pub use store::RunStore;
pub use sled_store::SledRunStore;
pub use memory::InMemoryRunStore;
pub use cache::CachedRunStore;
