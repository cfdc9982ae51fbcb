use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::role::{Role, RoleSet};

/// Every role-gated operation exposed by the recruitment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ViewPostings,
    ManagePostings,
    ListPostingApplications,
    AssignRole,
    ViewApplications,
    UpdateApplicationStatus,
    RecordScore,
    SubmitApplication,
    ListOwnApplications,
    DownloadCv,
    AmendApplication,
    DeleteApplication,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::ViewPostings,
        Operation::ManagePostings,
        Operation::ListPostingApplications,
        Operation::AssignRole,
        Operation::ViewApplications,
        Operation::UpdateApplicationStatus,
        Operation::RecordScore,
        Operation::SubmitApplication,
        Operation::ListOwnApplications,
        Operation::DownloadCv,
        Operation::AmendApplication,
        Operation::DeleteApplication,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Operation::ViewPostings => "view_postings",
            Operation::ManagePostings => "manage_postings",
            Operation::ListPostingApplications => "list_posting_applications",
            Operation::AssignRole => "assign_role",
            Operation::ViewApplications => "view_applications",
            Operation::UpdateApplicationStatus => "update_application_status",
            Operation::RecordScore => "record_score",
            Operation::SubmitApplication => "submit_application",
            Operation::ListOwnApplications => "list_own_applications",
            Operation::DownloadCv => "download_cv",
            Operation::AmendApplication => "amend_application",
            Operation::DeleteApplication => "delete_application",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const STAFF: RoleSet = RoleSet::of(&[Role::Admin, Role::Recruiter]);

/// Default grants. Record-level operations additionally admit the record owner.
pub const STANDARD_POLICY: [(Operation, RoleSet); 12] = [
    (
        Operation::ViewPostings,
        RoleSet::of(&[Role::Admin, Role::Recruiter, Role::Candidate]),
    ),
    (Operation::ManagePostings, STAFF),
    (Operation::ListPostingApplications, RoleSet::only(Role::Admin)),
    (Operation::AssignRole, RoleSet::only(Role::Admin)),
    (Operation::ViewApplications, STAFF),
    (Operation::UpdateApplicationStatus, STAFF),
    (Operation::RecordScore, STAFF),
    (Operation::SubmitApplication, RoleSet::only(Role::Candidate)),
    (Operation::ListOwnApplications, RoleSet::only(Role::Candidate)),
    (Operation::DownloadCv, STAFF),
    (Operation::AmendApplication, STAFF),
    (Operation::DeleteApplication, STAFF),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("operation {0} has an empty role set and could never be reached")]
    EmptyRoleSet(Operation),
    #[error("operation {0} has no policy entry")]
    MissingOperation(Operation),
}

/// Static, inspectable mapping of operation to permitted roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<Operation, RoleSet>,
}

impl PolicyTable {
    pub fn new(
        entries: impl IntoIterator<Item = (Operation, RoleSet)>,
    ) -> Result<Self, PolicyError> {
        let mut table = BTreeMap::new();
        for (operation, roles) in entries {
            if roles.is_empty() {
                return Err(PolicyError::EmptyRoleSet(operation));
            }
            table.insert(operation, roles);
        }

        if let Some(missing) = Operation::ALL
            .into_iter()
            .find(|operation| !table.contains_key(operation))
        {
            return Err(PolicyError::MissingOperation(missing));
        }

        Ok(Self { entries: table })
    }

    pub fn standard() -> Self {
        Self {
            entries: STANDARD_POLICY.into_iter().collect(),
        }
    }

    pub fn roles_for(&self, operation: Operation) -> RoleSet {
        self.entries
            .get(&operation)
            .copied()
            .unwrap_or(RoleSet::EMPTY)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Operation, RoleSet)> + '_ {
        self.entries.iter().map(|(operation, roles)| (*operation, *roles))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
