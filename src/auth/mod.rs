//! Authorization for the file server.
//!
//! Identity itself is established upstream (bearer tokens issued by the
//! login service); this module decides what an identity may do.

pub mod permission;

pub use permission::{DirectoryPermissions, Identity, PermissionCheck};
