use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::access::groups::RoleGroup;
use crate::access::policy::PolicyTable;
use crate::access::role::{Caller, Identity, IdentityId, Role};
use crate::access::store::{GroupMembershipStore, IdentityDirectory, RoleStore, StoreError};
use crate::access::{AuthorizationGate, ElevationPolicy, RoleAssignmentService};

#[derive(Default)]
pub(super) struct MemoryAccounts {
    identities: Mutex<Vec<Identity>>,
    roles: Mutex<HashMap<IdentityId, Role>>,
    pub(super) unavailable: AtomicBool,
}

impl MemoryAccounts {
    pub(super) fn with_role(&self, handle: &str, role: Option<Role>, elevated: bool) -> Identity {
        let identity = self
            .create(handle, None, elevated)
            .expect("identity created");
        if let Some(role) = role {
            self.set_role(identity.id, role).expect("role stored");
        }
        identity
    }
}

impl IdentityDirectory for MemoryAccounts {
    fn create(
        &self,
        handle: &str,
        email: Option<String>,
        elevated: bool,
    ) -> Result<Identity, StoreError> {
        let mut identities = self.identities.lock().expect("directory mutex poisoned");
        if identities.iter().any(|identity| identity.handle == handle) {
            return Err(StoreError::DuplicateHandle(handle.to_string()));
        }
        let identity = Identity {
            id: IdentityId(identities.len() as u64 + 1),
            handle: handle.to_string(),
            email,
            elevated,
        };
        identities.push(identity.clone());
        Ok(identity)
    }

    fn find(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let identities = self.identities.lock().expect("directory mutex poisoned");
        Ok(identities.iter().find(|identity| identity.id == id).cloned())
    }

    fn remove(&self, id: IdentityId) -> Result<(), StoreError> {
        let mut identities = self.identities.lock().expect("directory mutex poisoned");
        let before = identities.len();
        identities.retain(|identity| identity.id != id);
        if identities.len() == before {
            return Err(StoreError::UnknownIdentity(id));
        }
        self.roles.lock().expect("role mutex poisoned").remove(&id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.identities.lock().expect("directory mutex poisoned").clone())
    }
}

impl RoleStore for MemoryAccounts {
    fn get_role(&self, id: IdentityId) -> Result<Option<Role>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("role store offline".to_string()));
        }
        Ok(self.roles.lock().expect("role mutex poisoned").get(&id).copied())
    }

    fn set_role(&self, id: IdentityId, role: Role) -> Result<(), StoreError> {
        self.roles.lock().expect("role mutex poisoned").insert(id, role);
        Ok(())
    }

    fn elevated(&self, id: IdentityId) -> Result<bool, StoreError> {
        Ok(self
            .find(id)?
            .map(|identity| identity.elevated)
            .unwrap_or(false))
    }
}

#[derive(Default)]
pub(super) struct MemoryGroups {
    memberships: Mutex<HashMap<IdentityId, BTreeSet<RoleGroup>>>,
    pub(super) writes: Mutex<Vec<(IdentityId, RoleGroup)>>,
    pub(super) failing: AtomicBool,
}

impl GroupMembershipStore for MemoryGroups {
    fn replace_role_groups(&self, id: IdentityId, group: RoleGroup) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("group store offline".to_string()));
        }
        let mut memberships = self.memberships.lock().expect("group mutex poisoned");
        let groups = memberships.entry(id).or_default();
        groups.clear();
        groups.insert(group);
        self.writes
            .lock()
            .expect("write log poisoned")
            .push((id, group));
        Ok(())
    }

    fn role_groups(&self, id: IdentityId) -> Result<BTreeSet<RoleGroup>, StoreError> {
        Ok(self
            .memberships
            .lock()
            .expect("group mutex poisoned")
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

pub(super) fn gate(accounts: &Arc<MemoryAccounts>) -> AuthorizationGate {
    AuthorizationGate::new(
        accounts.clone(),
        PolicyTable::standard(),
        ElevationPolicy::Bypass,
    )
}

pub(super) fn assignments(
    accounts: &Arc<MemoryAccounts>,
    groups: &Arc<MemoryGroups>,
) -> RoleAssignmentService {
    RoleAssignmentService::new(accounts.clone(), accounts.clone(), groups.clone())
}

pub(super) fn caller(identity: &Identity) -> Caller {
    Caller::Identified(identity.clone())
}
