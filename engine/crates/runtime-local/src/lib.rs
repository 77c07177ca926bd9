mod kv;
#[cfg(feature = "redis")]
mod redis;

pub use kv::InMemoryKv;
#[cfg(feature = "redis")]
pub use redis::RedisKv;
