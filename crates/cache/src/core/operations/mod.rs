//! Cache operations

mod batch;
pub(crate) mod get;
pub(crate) mod misc;
mod put;
mod remove;
