//! Role groups mirror each identity's role so permission checks can be made
//! against group grants without consulting the role store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info};

use super::role::{Identity, IdentityId, Role};
use super::store::{GroupMembershipStore, IdentityDirectory, RoleStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleGroup {
    AdminGroup,
    RecruiterGroup,
    CandidateGroup,
}

impl RoleGroup {
    pub const ALL: [RoleGroup; 3] = [
        RoleGroup::AdminGroup,
        RoleGroup::RecruiterGroup,
        RoleGroup::CandidateGroup,
    ];

    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => RoleGroup::AdminGroup,
            Role::Recruiter => RoleGroup::RecruiterGroup,
            Role::Candidate => RoleGroup::CandidateGroup,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RoleGroup::AdminGroup => "admin_group",
            RoleGroup::RecruiterGroup => "recruiter_group",
            RoleGroup::CandidateGroup => "candidate_group",
        }
    }

    pub const fn grants(self) -> &'static [GroupPermission] {
        use GroupPermission::*;
        match self {
            RoleGroup::AdminGroup => &[
                AddIdentity,
                ChangeIdentity,
                DeleteIdentity,
                ViewIdentity,
                ManageUsers,
                ManageRecruitment,
                ApplyJobs,
            ],
            RoleGroup::RecruiterGroup => &[ViewIdentity, ChangeIdentity, ManageRecruitment],
            RoleGroup::CandidateGroup => &[ViewIdentity, ApplyJobs],
        }
    }
}

impl fmt::Display for RoleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPermission {
    AddIdentity,
    ChangeIdentity,
    DeleteIdentity,
    ViewIdentity,
    ManageUsers,
    ManageRecruitment,
    ApplyJobs,
}

impl GroupPermission {
    pub const fn codename(self) -> &'static str {
        match self {
            GroupPermission::AddIdentity => "add_identity",
            GroupPermission::ChangeIdentity => "change_identity",
            GroupPermission::DeleteIdentity => "delete_identity",
            GroupPermission::ViewIdentity => "view_identity",
            GroupPermission::ManageUsers => "can_manage_users",
            GroupPermission::ManageRecruitment => "can_manage_recruitment",
            GroupPermission::ApplyJobs => "can_apply_jobs",
        }
    }
}

/// Group definitions with their permission grants.
pub fn group_catalog() -> Vec<(RoleGroup, &'static [GroupPermission])> {
    RoleGroup::ALL
        .into_iter()
        .map(|group| (group, group.grants()))
        .collect()
}

/// The only write path for role assignments. Each write resynchronizes the
/// identity's role group while holding that identity's lock.
pub struct RoleAssignmentService {
    directory: Arc<dyn IdentityDirectory>,
    roles: Arc<dyn RoleStore>,
    groups: Arc<dyn GroupMembershipStore>,
    locks: Mutex<HashMap<IdentityId, Arc<Mutex<()>>>>,
}

impl RoleAssignmentService {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        roles: Arc<dyn RoleStore>,
        groups: Arc<dyn GroupMembershipStore>,
    ) -> Self {
        Self {
            directory,
            roles,
            groups,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: IdentityId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Unavailable("assignment lock table poisoned".to_string()))?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Drops the table entry once no other writer holds or waits on it.
    fn release(&self, id: IdentityId, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Clones are only taken and dropped under the table lock.
        drop(lock);
        if locks
            .get(&id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    pub fn assign(&self, id: IdentityId, role: Role) -> Result<(), StoreError> {
        let lock = self.lock_for(id)?;
        let result = match lock.lock() {
            Ok(_held) => self.write_role(id, role),
            Err(_) => Err(StoreError::Unavailable(format!(
                "assignment lock for {id} poisoned"
            ))),
        };
        self.release(id, lock);
        result
    }

    fn write_role(&self, id: IdentityId, role: Role) -> Result<(), StoreError> {
        let previous = self.roles.get_role(id)?;
        self.roles.set_role(id, role)?;

        if let Err(err) = self.groups.replace_role_groups(id, RoleGroup::for_role(role)) {
            match previous {
                Some(previous) => {
                    if let Err(restore) = self.roles.set_role(id, previous) {
                        error!(identity = %id, error = %restore, "failed to restore role after group sync failure");
                    }
                }
                None => {
                    error!(identity = %id, %role, "group sync failed for first role assignment");
                }
            }
            return Err(err);
        }

        if previous != Some(role) {
            info!(identity = %id, from = ?previous, to = %role, "role assigned");
        }
        Ok(())
    }

    /// Self-registration always yields a candidate. The identity is removed
    /// again when the candidate role cannot be assigned, so the handle stays free.
    pub fn register_candidate(&self, handle: &str, email: String) -> Result<Identity, StoreError> {
        let identity = self.directory.create(handle, Some(email), false)?;
        if let Err(err) = self.assign(identity.id, Role::Candidate) {
            if let Err(cleanup) = self.directory.remove(identity.id) {
                error!(identity = %identity.id, error = %cleanup, "failed to remove half-registered identity");
            }
            return Err(err);
        }
        Ok(identity)
    }

    pub fn has_permission(
        &self,
        identity: &Identity,
        permission: GroupPermission,
    ) -> Result<bool, StoreError> {
        if identity.elevated {
            return Ok(true);
        }
        let groups = self.groups.role_groups(identity.id)?;
        Ok(groups
            .iter()
            .any(|group| group.grants().contains(&permission)))
    }
}
