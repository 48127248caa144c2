//! Wire client for the Bot API.
//!
//! Sends typed [`Method`](courier_api::Method)s as JSON or multipart, decodes
//! the response envelope, classifies failures and retries a rate-limited call
//! exactly once.

mod client;
pub mod error;
mod payload;
pub mod pool;

pub use {
    client::{Client, ClientBuilder, DEFAULT_TIMEOUT, RequestInfo},
    error::{Error, Result},
    payload::Payload,
    pool::{BufferPool, PooledBuffer},
};
