//! Shared protocol definitions for the CloudBoard wire format.

pub mod event;
pub mod task;
