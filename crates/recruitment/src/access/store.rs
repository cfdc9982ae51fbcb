use std::collections::BTreeSet;

use super::groups::RoleGroup;
use super::role::{Identity, IdentityId, Role};

/// Role-assignment store. Absence of a role is a value, not an error.
pub trait RoleStore: Send + Sync {
    fn get_role(&self, id: IdentityId) -> Result<Option<Role>, StoreError>;
    fn set_role(&self, id: IdentityId, role: Role) -> Result<(), StoreError>;
    fn elevated(&self, id: IdentityId) -> Result<bool, StoreError>;
}

/// Denormalized group memberships used for permission checks.
pub trait GroupMembershipStore: Send + Sync {
    /// Drops every role group the identity belongs to and adds `group`.
    /// Non-role groups are left untouched. Must be transactional.
    fn replace_role_groups(&self, id: IdentityId, group: RoleGroup) -> Result<(), StoreError>;
    fn role_groups(&self, id: IdentityId) -> Result<BTreeSet<RoleGroup>, StoreError>;
}

/// Account registry backing caller resolution and notification fan-out.
pub trait IdentityDirectory: Send + Sync {
    fn create(
        &self,
        handle: &str,
        email: Option<String>,
        elevated: bool,
    ) -> Result<Identity, StoreError>;
    fn find(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;
    /// Drops the identity together with its role assignment.
    fn remove(&self, id: IdentityId) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<Identity>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("identity {0} not found")]
    UnknownIdentity(IdentityId),
    #[error("handle '{0}' is already registered")]
    DuplicateHandle(String),
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
