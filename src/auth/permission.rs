//! Directory permission checking.
//!
//! Access is decided per top-level directory from its configuration:
//! the requested action must be listed in the directory's permissions and
//! the caller must hold one of its required roles (none = everyone).
//! `user_private` directories are special: `user/<name>` is open only to
//! the user called `<name>` and to holders of the admin role.

use std::sync::Arc;

use crate::config::{Action, Config, DirectoryConfig, DirectoryType};
use crate::{FileServerError, Result};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier (also the upload owner id).
    pub user_id: String,
    /// Username, used as the private directory name.
    pub username: String,
    /// Role identifiers held by the user.
    pub roles: Vec<String>,
}

impl Identity {
    /// Create an identity.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles,
        }
    }

    /// Whether the identity holds the given role.
    pub fn has_role(&self, role: &str) -> bool {
        !role.is_empty() && self.roles.iter().any(|r| r == role)
    }
}

/// Decides whether a caller may perform an action on a directory.
pub trait PermissionCheck: Send + Sync {
    /// Returns `Ok(true)` when allowed, `Ok(false)` when denied and an
    /// error when the directory is unknown.
    fn check_permission(&self, identity: &Identity, directory: &str, action: Action)
        -> Result<bool>;

    /// Whether the identity has administrative rights.
    fn is_admin(&self, identity: &Identity) -> bool;

    /// Directories the identity can see.
    fn accessible_directories(&self, identity: &Identity) -> Vec<DirectoryConfig>;
}

/// Permission checker backed by the configured directory rules.
#[derive(Debug, Clone)]
pub struct DirectoryPermissions {
    config: Arc<Config>,
}

impl DirectoryPermissions {
    /// Create a checker from the application configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn check_user_private(&self, identity: &Identity, parts: &[&str], action: Action) -> bool {
        match parts.get(1) {
            // The container itself can be browsed but holds no files.
            None => action == Action::Read,
            Some(owner) => *owner == identity.username || self.is_admin(identity),
        }
    }
}

impl PermissionCheck for DirectoryPermissions {
    fn check_permission(
        &self,
        identity: &Identity,
        directory: &str,
        action: Action,
    ) -> Result<bool> {
        let parts: Vec<&str> = directory.split('/').filter(|p| !p.is_empty()).collect();
        let root = parts.first().copied().unwrap_or_default();

        let dir = self
            .config
            .directory_config(root)
            .ok_or_else(|| FileServerError::NotFound(format!("directory '{root}'")))?;

        if !dir.allows(action) {
            tracing::debug!(
                user_id = %identity.user_id,
                directory = %directory,
                action = action.as_str(),
                "Action not permitted in directory"
            );
            return Ok(false);
        }

        if dir.dir_type == DirectoryType::UserPrivate {
            return Ok(self.check_user_private(identity, &parts, action));
        }

        Ok(roles_match(dir, identity))
    }

    fn is_admin(&self, identity: &Identity) -> bool {
        identity.has_role(&self.config.auth.admin_role)
    }

    /// Private containers are mapped to the caller's own sub-directory.
    fn accessible_directories(&self, identity: &Identity) -> Vec<DirectoryConfig> {
        self.config
            .storage
            .directories
            .iter()
            .filter_map(|dir| {
                if dir.dir_type == DirectoryType::UserPrivate {
                    let mut own = dir.clone();
                    own.path = format!("{}/{}", dir.path, identity.username);
                    Some(own)
                } else if roles_match(dir, identity) {
                    Some(dir.clone())
                } else {
                    None
                }
            })
            .collect()
    }
}

fn roles_match(dir: &DirectoryConfig, identity: &Identity) -> bool {
    dir.required_roles.is_empty() || dir.required_roles.iter().any(|r| identity.has_role(r))
}
