//! Cache service clients.

pub mod memory;
pub mod redis_client;

pub use memory::MemoryCacheClient;
pub use redis_client::RedisCacheClient;
