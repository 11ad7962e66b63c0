pub mod elastic;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod registry;
pub mod store;

pub use elastic::EsStore;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use registry::StoreRegistry;
pub use store::TrendStore;
