use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::policy::{Operation, PolicyTable};
use super::role::{Caller, IdentityId, Role, RoleSet};
use super::store::{RoleStore, StoreError};

/// Treatment of elevated (platform operator) identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationPolicy {
    /// Elevated identities satisfy every role requirement.
    #[default]
    Bypass,
    /// Elevated identities count as `Admin` and nothing else.
    AdminEquivalent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "role", rename_all = "snake_case")]
pub enum DenyReason {
    Anonymous,
    NoRole,
    RoleNotPermitted(Role),
    LookupFailed,
    MisconfiguredPolicy,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Anonymous => f.write_str("authentication required"),
            DenyReason::NoRole => f.write_str("no role assigned"),
            DenyReason::RoleNotPermitted(role) => write!(f, "role {role} is not permitted"),
            DenyReason::LookupFailed => f.write_str("role could not be verified"),
            DenyReason::MisconfiguredPolicy => f.write_str("operation is not configured"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn denial(self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }

    /// Converts a denial into an error for `?` propagation.
    pub fn require(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Pure decision procedure. `lookup` is only consulted for identified,
/// non-bypassing callers; any lookup failure denies.
pub fn authorize<F>(
    caller: &Caller,
    required: RoleSet,
    elevation: ElevationPolicy,
    lookup: F,
) -> Decision
where
    F: FnOnce(IdentityId) -> Result<Option<Role>, StoreError>,
{
    if required.is_empty() {
        return Decision::Deny(DenyReason::MisconfiguredPolicy);
    }

    let identity = match caller {
        Caller::Anonymous => return Decision::Deny(DenyReason::Anonymous),
        Caller::Identified(identity) => identity,
    };

    if identity.elevated {
        return match elevation {
            ElevationPolicy::Bypass => Decision::Allow,
            ElevationPolicy::AdminEquivalent if required.contains(Role::Admin) => Decision::Allow,
            ElevationPolicy::AdminEquivalent => {
                Decision::Deny(DenyReason::RoleNotPermitted(Role::Admin))
            }
        };
    }

    match lookup(identity.id) {
        Ok(Some(role)) if required.contains(role) => Decision::Allow,
        Ok(Some(role)) => Decision::Deny(DenyReason::RoleNotPermitted(role)),
        Ok(None) => Decision::Deny(DenyReason::NoRole),
        Err(err) => {
            warn!(identity = %identity.id, error = %err, "role lookup failed; denying");
            Decision::Deny(DenyReason::LookupFailed)
        }
    }
}

/// Gate consulted before every role-sensitive operation.
#[derive(Clone)]
pub struct AuthorizationGate {
    roles: Arc<dyn RoleStore>,
    policy: PolicyTable,
    elevation: ElevationPolicy,
}

impl AuthorizationGate {
    pub fn new(roles: Arc<dyn RoleStore>, policy: PolicyTable, elevation: ElevationPolicy) -> Self {
        Self {
            roles,
            policy,
            elevation,
        }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn elevation(&self) -> ElevationPolicy {
        self.elevation
    }

    pub fn authorize(&self, caller: &Caller, required: RoleSet) -> Decision {
        if required.is_empty() {
            error!("authorization requested against an empty role set");
        }
        authorize(caller, required, self.elevation, |id| self.roles.get_role(id))
    }

    pub fn authorize_operation(&self, caller: &Caller, operation: Operation) -> Decision {
        let decision = self.authorize(caller, self.policy.roles_for(operation));
        if let Decision::Deny(reason) = decision {
            debug!(%operation, caller = ?caller.id(), %reason, "operation denied");
        }
        decision
    }

    /// Record-level check: the operation's roles, or the record's owner.
    pub fn authorize_record(
        &self,
        caller: &Caller,
        operation: Operation,
        owner: IdentityId,
    ) -> Decision {
        if caller.id() == Some(owner) {
            return Decision::Allow;
        }
        self.authorize_operation(caller, operation)
    }

    /// The caller's role for scoping queries; failures read as "no role".
    pub fn role_of(&self, caller: &Caller) -> Option<Role> {
        let id = caller.id()?;
        match self.roles.get_role(id) {
            Ok(role) => role,
            Err(err) => {
                warn!(identity = %id, error = %err, "role lookup failed");
                None
            }
        }
    }
}
