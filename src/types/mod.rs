//! Plain data types shared between the store, the service and reports.

pub mod artifacts;
pub mod identity;
