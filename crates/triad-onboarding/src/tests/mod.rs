//! Service tests against in-memory SQLite.

pub(crate) mod common;

mod activation;
