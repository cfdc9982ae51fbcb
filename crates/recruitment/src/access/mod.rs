//! Role-based access control: the authorization gate, its policy table and
//! the role-assignment write path.

pub mod gate;
pub mod groups;
pub mod policy;
pub mod role;
pub mod store;

#[cfg(test)]
mod tests;

pub use gate::{authorize, AuthorizationGate, Decision, DenyReason, ElevationPolicy};
pub use groups::{group_catalog, GroupPermission, RoleAssignmentService, RoleGroup};
pub use policy::{Operation, PolicyError, PolicyTable, STANDARD_POLICY};
pub use role::{Caller, Identity, IdentityId, Role, RoleSet, UnknownRole};
pub use store::{GroupMembershipStore, IdentityDirectory, RoleStore, StoreError};
