use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    authz::Actor,
    error::{Error, Result},
    object::{Audit, catalog::optional_text, catalog::required_text, impl_object},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Urgent,
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(Error::Validation(format!("unknown severity: {}", other))),
        }
    }
}

/// A one-off task. Unlike trackers there is no approval gate and no lateness
/// penalty: completing it pays `reward` to the primary assignee.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub reward: u64,
    /// First entry is the primary assignee.
    pub assignees: Vec<Uuid>,
    pub assignee_notes: Option<String>,
    pub completed: bool,
    pub completed_date: Option<NaiveDate>,
    pub completed_by_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub audit: Audit,
}

impl_object!(Project, "project");

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub reward: u64,
    #[serde(default)]
    pub assignees: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub severity: Option<Option<Severity>>,
    pub reward: Option<u64>,
    pub assignee_notes: Option<Option<String>>,
    pub assignees: Option<Vec<Uuid>>,
}

impl Project {
    pub fn create(input: NewProject, creator: &Actor, now: DateTime<Utc>) -> Result<Self> {
        let name = required_text(&input.name, "project name")?;
        let assignees = resolve_assignees(input.assignees, creator)?;

        Ok(Self {
            id: Uuid::now_v7(),
            name,
            description: optional_text(input.description),
            severity: input.severity,
            reward: input.reward,
            assignees,
            assignee_notes: None,
            completed: false,
            completed_date: None,
            completed_by_id: None,
            created_by: creator.id,
            created_at: now,
            audit: Audit::default(),
        })
    }

    pub fn primary_assignee(&self) -> Option<Uuid> {
        self.assignees.first().copied()
    }

    pub fn is_assignee(&self, user: Uuid) -> bool {
        self.assignees.contains(&user)
    }

    pub fn can_manage(&self, actor: &Actor) -> bool {
        actor.is_admin || self.is_assignee(actor.id)
    }

    pub fn apply(&self, actor: &Actor, update: ProjectUpdate, now: DateTime<Utc>) -> Result<Self> {
        self.authorize(actor, "edit this project")?;
        self.expect_open()?;

        let mut next = self.clone();
        if let Some(name) = update.name {
            next.name = required_text(&name, "project name")?;
        }
        if let Some(description) = update.description {
            next.description = optional_text(description);
        }
        if let Some(severity) = update.severity {
            next.severity = severity;
        }
        if let Some(reward) = update.reward {
            next.reward = reward;
        }
        if let Some(notes) = update.assignee_notes {
            next.assignee_notes = optional_text(notes);
        }
        if let Some(assignees) = update.assignees {
            next.assignees = resolve_assignees(assignees, actor)?;
        }
        next.audit.stamp(actor.id, now);
        Ok(next)
    }

    /// One-way transition to completed.
    pub fn complete(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Self> {
        self.authorize(actor, "complete this project")?;
        self.expect_open()?;

        let mut next = self.clone();
        next.completed = true;
        next.completed_date = Some(now.date_naive());
        next.completed_by_id = Some(actor.id);
        next.audit.stamp(actor.id, now);
        Ok(next)
    }

    pub(crate) fn authorize(&self, actor: &Actor, action: &str) -> Result<()> {
        if self.can_manage(actor) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "only an assignee or an administrator can {}",
                action
            )))
        }
    }

    pub(crate) fn expect_open(&self) -> Result<()> {
        if self.completed {
            Err(Error::state("open", "completed"))
        } else {
            Ok(())
        }
    }
}

/// Empty means self-assignment. Only administrators may assign others.
fn resolve_assignees(mut requested: Vec<Uuid>, actor: &Actor) -> Result<Vec<Uuid>> {
    if requested.is_empty() {
        return Ok(vec![actor.id]);
    }
    if !actor.is_admin && requested.iter().any(|user| *user != actor.id) {
        return Err(Error::Unauthorized(
            "only an administrator can assign projects to others".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(requested.len());
    requested.retain(|user| {
        if seen.contains(user) {
            false
        } else {
            seen.push(*user);
            true
        }
    });
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(assignees: Vec<Uuid>) -> NewProject {
        NewProject {
            name: "Clean the garage".to_string(),
            reward: 40,
            severity: Some(Severity::High),
            assignees,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_to_self_assignment() {
        let member = Actor::member(Uuid::now_v7());
        let project = Project::create(input(vec![]), &member, Utc::now()).unwrap();
        assert_eq!(project.assignees, vec![member.id]);
        assert_eq!(project.primary_assignee(), Some(member.id));
    }

    #[test]
    fn test_only_admins_assign_others() {
        let member = Actor::member(Uuid::now_v7());
        let other = Uuid::now_v7();
        assert!(matches!(
            Project::create(input(vec![other]), &member, Utc::now()),
            Err(Error::Unauthorized(_))
        ));

        let admin = Actor::admin(Uuid::now_v7());
        let project = Project::create(input(vec![other, member.id, other]), &admin, Utc::now())
            .unwrap();
        assert_eq!(project.assignees, vec![other, member.id]);
    }

    #[test]
    fn test_complete_is_one_way() {
        let member = Actor::member(Uuid::now_v7());
        let project = Project::create(input(vec![]), &member, Utc::now()).unwrap();

        let done = project.complete(&member, Utc::now()).unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_by_id, Some(member.id));
        assert!(matches!(
            done.complete(&member, Utc::now()),
            Err(Error::InvalidState { .. })
        ));
        assert!(done
            .apply(&member, ProjectUpdate::default(), Utc::now())
            .is_err());
    }

    #[test]
    fn test_strangers_cannot_complete() {
        let member = Actor::member(Uuid::now_v7());
        let project = Project::create(input(vec![]), &member, Utc::now()).unwrap();
        assert!(matches!(
            project.complete(&Actor::member(Uuid::now_v7()), Utc::now()),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!("Urgent".parse::<Severity>().unwrap(), Severity::Urgent);
        assert!("meh".parse::<Severity>().is_err());
    }
}
