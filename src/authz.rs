//! Who may trigger which transition.
//!
//! Authorization failures are always reported as [`Error::Unauthorized`] and
//! are checked before any state check, so a caller can tell "you may not do
//! this" apart from "this is no longer possible".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// An already-authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(id: Uuid, is_admin: bool) -> Self {
        Self { id, is_admin }
    }

    pub fn member(id: Uuid) -> Self {
        Self::new(id, false)
    }

    pub fn admin(id: Uuid) -> Self {
        Self::new(id, true)
    }
}

/// Who may approve, reinstate or skip a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "user", rename_all = "snake_case")]
pub enum ApprovalRule {
    /// Only the recorded assigning user.
    AssignerRequired(Uuid),
    /// No assigner recorded: any administrator.
    AnyAdministrator,
}

impl ApprovalRule {
    pub fn for_assigner(assigned_by: Option<Uuid>) -> Self {
        match assigned_by {
            Some(user) => Self::AssignerRequired(user),
            None => Self::AnyAdministrator,
        }
    }

    pub fn permits(&self, actor: &Actor) -> bool {
        match self {
            Self::AssignerRequired(assigner) => *assigner == actor.id,
            Self::AnyAdministrator => actor.is_admin,
        }
    }

    pub fn authorize(&self, actor: &Actor, action: &str) -> Result<()> {
        if self.permits(actor) {
            return Ok(());
        }

        Err(Error::Unauthorized(match self {
            Self::AssignerRequired(_) => format!("only the assigner can {}", action),
            Self::AnyAdministrator => format!("only an administrator can {}", action),
        }))
    }

    /// The assigner whose own `mark_done` counts as approval.
    pub fn assigner(&self) -> Option<Uuid> {
        match self {
            Self::AssignerRequired(user) => Some(*user),
            Self::AnyAdministrator => None,
        }
    }
}

/// `mark_done` is open to the assignee, to whoever may approve, and to any
/// administrator. Unassigned trackers may be picked up by anyone.
pub fn authorize_mark_done(
    assignee: Option<Uuid>,
    rule: &ApprovalRule,
    actor: &Actor,
) -> Result<()> {
    let allowed = match assignee {
        None => true,
        Some(user) => user == actor.id || rule.permits(actor) || actor.is_admin,
    };

    if allowed {
        Ok(())
    } else {
        Err(Error::Unauthorized(
            "only the assignee, the assigner or an administrator can mark this done".to_string(),
        ))
    }
}

pub fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(Error::Unauthorized(format!(
            "only an administrator can {}",
            action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigner_rule() {
        let assigner = Uuid::now_v7();
        let rule = ApprovalRule::for_assigner(Some(assigner));

        assert!(rule.permits(&Actor::member(assigner)));
        // Being an administrator does not bypass a recorded assigner
        assert!(!rule.permits(&Actor::admin(Uuid::now_v7())));
        assert!(matches!(
            rule.authorize(&Actor::member(Uuid::now_v7()), "approve"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_any_administrator_rule() {
        let rule = ApprovalRule::for_assigner(None);
        assert_eq!(rule, ApprovalRule::AnyAdministrator);
        assert!(rule.permits(&Actor::admin(Uuid::now_v7())));
        assert!(!rule.permits(&Actor::member(Uuid::now_v7())));
        assert_eq!(rule.assigner(), None);
    }

    #[test]
    fn test_mark_done_authorization() {
        let assignee = Uuid::now_v7();
        let assigner = Uuid::now_v7();
        let rule = ApprovalRule::AssignerRequired(assigner);

        assert!(authorize_mark_done(Some(assignee), &rule, &Actor::member(assignee)).is_ok());
        assert!(authorize_mark_done(Some(assignee), &rule, &Actor::member(assigner)).is_ok());
        assert!(authorize_mark_done(Some(assignee), &rule, &Actor::admin(Uuid::now_v7())).is_ok());
        assert!(
            authorize_mark_done(Some(assignee), &rule, &Actor::member(Uuid::now_v7())).is_err()
        );
        assert!(authorize_mark_done(None, &rule, &Actor::member(Uuid::now_v7())).is_ok());
    }
}
