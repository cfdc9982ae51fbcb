//! Domain events raised by the recruitment service and their fan-out into
//! in-app notifications with an optional e-mail copy.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::access::{Identity, IdentityDirectory, IdentityId, Role, RoleStore, StoreError};

use super::domain::{ApplicationId, ApplicationStatus, Posting};

#[derive(Debug, Clone, PartialEq)]
pub enum RecruitmentEvent {
    PostingCreated {
        posting: Posting,
    },
    ApplicationCreated {
        application: ApplicationId,
        candidate: IdentityId,
        posting_title: String,
    },
    ApplicationStatusChanged {
        application: ApplicationId,
        candidate: IdentityId,
        posting_title: String,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewApplication,
    ApplicationStatus,
    NewPosting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// One in-app message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: IdentityId,
    pub kind: NotificationKind,
    pub message: String,
    pub email: Option<EmailMessage>,
}

/// Outbound delivery hook (in-app inbox, SMTP relay, ...).
pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Resolves recipients for an event and hands each one a rendered
/// notification. Delivery problems are logged and never surface to callers.
pub struct NotificationDispatcher {
    directory: Arc<dyn IdentityDirectory>,
    roles: Arc<dyn RoleStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        roles: Arc<dyn RoleStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            directory,
            roles,
            notifier,
        }
    }

    /// Returns the number of notifications accepted by the notifier.
    pub fn dispatch(&self, event: &RecruitmentEvent) -> usize {
        let recipients = match self.recipients(event) {
            Ok(recipients) => recipients,
            Err(err) => {
                warn!(error = %err, "could not resolve notification recipients");
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient in &recipients {
            let notification = self.render(event, recipient);
            match self.notifier.deliver(notification) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(recipient = %recipient.id, error = %err, "notification delivery failed")
                }
            }
        }
        debug!(delivered, total = recipients.len(), "notifications dispatched");
        delivered
    }

    fn recipients(&self, event: &RecruitmentEvent) -> Result<Vec<Identity>, StoreError> {
        match event {
            RecruitmentEvent::PostingCreated { .. } => {
                self.matching(|identity, role| identity.elevated || role == Some(Role::Admin))
            }
            RecruitmentEvent::ApplicationCreated { .. } => self.matching(|_, role| {
                matches!(role, Some(Role::Admin) | Some(Role::Recruiter))
            }),
            RecruitmentEvent::ApplicationStatusChanged {
                candidate, from, to, ..
            } => {
                if from == to {
                    return Ok(Vec::new());
                }
                Ok(self.directory.find(*candidate)?.into_iter().collect())
            }
        }
    }

    fn matching<F>(&self, keep: F) -> Result<Vec<Identity>, StoreError>
    where
        F: Fn(&Identity, Option<Role>) -> bool,
    {
        let mut seen = BTreeSet::new();
        let mut selected = Vec::new();
        for identity in self.directory.list()? {
            let role = self.roles.get_role(identity.id)?;
            if keep(&identity, role) && seen.insert(identity.id) {
                selected.push(identity);
            }
        }
        Ok(selected)
    }

    fn render(&self, event: &RecruitmentEvent, recipient: &Identity) -> Notification {
        let (kind, message, subject) = match event {
            RecruitmentEvent::PostingCreated { posting } => (
                NotificationKind::NewPosting,
                format!("A new posting was created: {}.", posting.title),
                "New posting created".to_string(),
            ),
            RecruitmentEvent::ApplicationCreated {
                candidate,
                posting_title,
                ..
            } => {
                let name = self
                    .directory
                    .find(*candidate)
                    .ok()
                    .flatten()
                    .map(|identity| identity.handle)
                    .unwrap_or_else(|| format!("candidate {candidate}"));
                (
                    NotificationKind::NewApplication,
                    format!("New application from {name} for posting: {posting_title}."),
                    "New application received".to_string(),
                )
            }
            RecruitmentEvent::ApplicationStatusChanged {
                posting_title, to, ..
            } => (
                NotificationKind::ApplicationStatus,
                format!(
                    "The status of your application for \"{posting_title}\" is now: {}.",
                    to.display_name()
                ),
                "Your application was updated".to_string(),
            ),
        };

        let email = recipient.email.as_ref().map(|to| EmailMessage {
            to: to.clone(),
            subject,
            body: format!("Hello {},\n\n{message}\n", recipient.handle),
        });

        Notification {
            recipient: recipient.id,
            kind,
            message,
            email,
        }
    }
}
