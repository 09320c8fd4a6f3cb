mod memory;
mod sled_store;
mod store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::GasBankStore;
