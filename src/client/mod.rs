//! Scoring service client.

mod http;
mod scoring;

#[cfg(test)]
pub(crate) mod testing;

pub use http::*;
pub use scoring::*;
