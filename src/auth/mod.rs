//! Access token authentication
//!
//! Handles:
//! - Bearer/Token header authentication
//! - Permission codenames
//! - Authentication middleware

mod middleware;
mod permission;

pub use middleware::{Caller, CurrentCaller, require_auth};
pub use permission::{Capability, Permission, UnknownPermission};
