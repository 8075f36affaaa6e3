// Lifecycle of a single chore occurrence.
//
//   pending ──mark_done──▶ pending_approval ──approve──▶ completed
//      │  ▲                      │
//      │  └──────reinstate───────┘
//      ├──mark_done (by assigner) / direct_complete──▶ completed
//      └──skip──▶ skipped
//
// Every transition here is pure: it validates authorization and the current
// status, then returns the next version of the tracker. Persisting it (with a
// compare-and-set on the old status) and paying out is the engine's job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    authz::{Actor, ApprovalRule, authorize_mark_done},
    error::{Error, Result},
    object::{Audit, TaskTemplate, catalog::optional_text, catalog::required_text, impl_object},
    reward,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Pending,
    PendingApproval,
    Completed,
    Skipped,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingApproval => "pending_approval",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn can_transition_to(&self, target: TrackerStatus) -> bool {
        use TrackerStatus::*;
        matches!(
            (self, target),
            (Pending, PendingApproval)
                | (Pending, Completed)
                | (Pending, Skipped)
                | (PendingApproval, Completed)
                | (PendingApproval, Pending)
        )
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_approval" => Ok(Self::PendingApproval),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(Error::Validation(format!("unknown status: {}", other))),
        }
    }
}

/// One due occurrence of a chore.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tracker {
    pub id: Uuid,
    /// `None` for ad-hoc entries and for completed trackers whose template
    /// was later deleted.
    pub template_id: Option<Uuid>,
    pub title: String,
    pub reward: u64,
    /// Nominal date of the occurrence.
    pub date: NaiveDate,
    pub due_by: Option<DateTime<Utc>>,
    pub frequency: Option<String>,
    pub room_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
    /// `None` means any administrator may approve.
    pub assigned_by_id: Option<Uuid>,
    pub status: TrackerStatus,
    pub assigner_notes: Option<String>,
    pub approved_by_id: Option<Uuid>,
    pub completed_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub audit: Audit,
}

impl_object!(Tracker, "tracker");

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTracker {
    pub date: Option<NaiveDate>,
    pub due_by: Option<DateTime<Utc>>,
    pub frequency: Option<String>,
    pub room_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdHocTracker {
    pub title: String,
    pub reward: u64,
    pub date: Option<NaiveDate>,
    pub due_by: Option<DateTime<Utc>>,
    pub room_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
}

/// What a successful transition means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Waiting on the assigner (or an administrator).
    AwaitingApproval,
    /// Terminal success; the reward must be paid out.
    Completed,
    Reinstated,
    Skipped,
    NotesUpdated,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub from: TrackerStatus,
    pub tracker: Tracker,
    pub outcome: Outcome,
}

impl Tracker {
    pub fn scheduled(
        template: &TaskTemplate,
        input: NewTracker,
        scheduler: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            template_id: Some(template.id),
            title: template.name.clone(),
            reward: template.reward,
            date: input.date.unwrap_or_else(|| now.date_naive()),
            due_by: input.due_by,
            frequency: input.frequency,
            room_id: input.room_id.or(template.room_id),
            assigned_user_id: input.assigned_user_id.or(template.assigned_user_id),
            assigned_by_id: template.assigned_by_id.or(Some(scheduler)),
            status: TrackerStatus::Pending,
            assigner_notes: optional_text(input.notes),
            approved_by_id: None,
            completed_on: None,
            created_at: now,
            audit: Audit::default(),
        }
    }

    pub fn adhoc(input: AdHocTracker, creator: &Actor, now: DateTime<Utc>) -> Result<Self> {
        let title = required_text(&input.title, "title")?;
        let assignee = match input.assigned_user_id {
            Some(user) if user != creator.id && !creator.is_admin => {
                return Err(Error::Unauthorized(
                    "you can only assign chores to yourself".to_string(),
                ));
            }
            Some(user) => Some(user),
            None if creator.is_admin => None,
            None => Some(creator.id),
        };

        Ok(Self {
            id: Uuid::now_v7(),
            template_id: None,
            title,
            reward: input.reward,
            date: input.date.unwrap_or_else(|| now.date_naive()),
            due_by: input.due_by,
            frequency: None,
            room_id: input.room_id,
            assigned_user_id: assignee,
            assigned_by_id: creator.is_admin.then_some(creator.id),
            status: TrackerStatus::Pending,
            assigner_notes: None,
            approved_by_id: None,
            completed_on: None,
            created_at: now,
            audit: Audit::default(),
        })
    }

    pub fn approval_rule(&self) -> ApprovalRule {
        ApprovalRule::for_assigner(self.assigned_by_id)
    }

    /// Date lateness is measured against.
    pub fn due_date(&self) -> NaiveDate {
        reward::effective_due_date(self.due_by, self.date)
    }

    pub fn mark_done(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Transition> {
        let rule = self.approval_rule();
        authorize_mark_done(self.assigned_user_id, &rule, actor)?;
        self.expect(TrackerStatus::Pending)?;

        // The assigner marking their own chore done is its own approval.
        if rule.assigner() == Some(actor.id) {
            return self.complete(actor, now);
        }

        let mut next = self.clone();
        next.status = TrackerStatus::PendingApproval;
        next.audit.stamp(actor.id, now);
        self.transition(next, Outcome::AwaitingApproval)
    }

    pub fn approve(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Transition> {
        self.approval_rule().authorize(actor, "approve completion")?;
        self.expect(TrackerStatus::PendingApproval)?;
        self.complete(actor, now)
    }

    pub fn reinstate(
        &self,
        actor: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        self.approval_rule().authorize(actor, "reinstate the chore")?;
        self.expect(TrackerStatus::PendingApproval)?;

        let mut next = self.clone();
        next.status = TrackerStatus::Pending;
        next.assigner_notes = optional_text(notes);
        next.audit.stamp(actor.id, now);
        self.transition(next, Outcome::Reinstated)
    }

    /// `mark_done` and `approve` in one step, for whoever may approve.
    pub fn direct_complete(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Transition> {
        self.approval_rule().authorize(actor, "complete the chore")?;
        self.expect(TrackerStatus::Pending)?;
        self.complete(actor, now)
    }

    pub fn skip(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Transition> {
        self.approval_rule().authorize(actor, "skip the chore")?;
        self.expect(TrackerStatus::Pending)?;

        let mut next = self.clone();
        next.status = TrackerStatus::Skipped;
        next.audit.stamp(actor.id, now);
        self.transition(next, Outcome::Skipped)
    }

    pub fn update_notes(
        &self,
        actor: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if !self.approval_rule().permits(actor) && !actor.is_admin {
            return Err(Error::Unauthorized(
                "only the assigner or an administrator can edit notes".to_string(),
            ));
        }
        if self.status.is_terminal() {
            return Err(Error::state("pending or pending_approval", self.status.as_str()));
        }

        let mut next = self.clone();
        next.assigner_notes = optional_text(notes);
        next.audit.stamp(actor.id, now);
        self.transition(next, Outcome::NotesUpdated)
    }

    fn complete(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Transition> {
        let mut next = self.clone();
        next.status = TrackerStatus::Completed;
        next.approved_by_id = Some(actor.id);
        next.completed_on = Some(now.date_naive());
        next.audit.stamp(actor.id, now);
        self.transition(next, Outcome::Completed)
    }

    fn expect(&self, status: TrackerStatus) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(Error::tracker_state(status, self.status))
        }
    }

    /// Status changes must follow the lifecycle table; edits that keep the
    /// status pass through.
    fn transition(&self, tracker: Tracker, outcome: Outcome) -> Result<Transition> {
        if tracker.status != self.status && !self.status.can_transition_to(tracker.status) {
            return Err(Error::InvalidState {
                expected: format!("a status that can move to {}", tracker.status),
                actual: self.status.as_str().to_string(),
            });
        }

        Ok(Transition {
            from: self.status,
            tracker,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap()
    }

    fn tracker(assignee: Uuid, assigner: Option<Uuid>) -> Tracker {
        Tracker {
            id: Uuid::now_v7(),
            template_id: None,
            title: "Vacuum".to_string(),
            reward: 10,
            date: now().date_naive(),
            due_by: None,
            frequency: None,
            room_id: None,
            assigned_user_id: Some(assignee),
            assigned_by_id: assigner,
            status: TrackerStatus::Pending,
            assigner_notes: None,
            approved_by_id: None,
            completed_on: None,
            created_at: now(),
            audit: Audit::default(),
        }
    }

    #[test]
    fn test_status_transitions() {
        use TrackerStatus::*;

        assert!(Pending.can_transition_to(PendingApproval));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Skipped));
        assert!(PendingApproval.can_transition_to(Completed));
        assert!(PendingApproval.can_transition_to(Pending));

        // Terminal states stay put
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(PendingApproval));
        assert!(!Skipped.can_transition_to(Pending));
        assert!(!PendingApproval.can_transition_to(Skipped));
    }

    #[test]
    fn test_transitions_follow_the_lifecycle_table() {
        let assignee = Uuid::now_v7();
        let mut done = tracker(assignee, None);
        done.status = TrackerStatus::Completed;

        let mut reopened = done.clone();
        reopened.status = TrackerStatus::Pending;
        let err = done.transition(reopened, Outcome::Reinstated).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        // Edits that keep the status are not moves
        let mut noted = done.clone();
        noted.assigner_notes = Some("Thanks".to_string());
        let kept = done.transition(noted, Outcome::NotesUpdated).unwrap();
        assert_eq!(kept.from, TrackerStatus::Completed);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TrackerStatus::Pending,
            TrackerStatus::PendingApproval,
            TrackerStatus::Completed,
            TrackerStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<TrackerStatus>().unwrap(), status);
        }
        assert!("done".parse::<TrackerStatus>().is_err());
    }

    #[test]
    fn test_mark_done_by_assignee_awaits_approval() {
        let assignee = Uuid::now_v7();
        let t = tracker(assignee, Some(Uuid::now_v7()));

        let transition = t.mark_done(&Actor::member(assignee), now()).unwrap();
        assert_eq!(transition.outcome, Outcome::AwaitingApproval);
        assert_eq!(transition.from, TrackerStatus::Pending);
        assert_eq!(transition.tracker.status, TrackerStatus::PendingApproval);
        assert_eq!(transition.tracker.audit.updated_by, Some(assignee));
        assert!(transition.tracker.approved_by_id.is_none());
    }

    #[test]
    fn test_mark_done_by_assigner_completes() {
        let assigner = Uuid::now_v7();
        let t = tracker(assigner, Some(assigner));

        let transition = t.mark_done(&Actor::member(assigner), now()).unwrap();
        assert_eq!(transition.outcome, Outcome::Completed);
        assert_eq!(transition.tracker.status, TrackerStatus::Completed);
        assert_eq!(transition.tracker.approved_by_id, Some(assigner));
        assert_eq!(transition.tracker.completed_on, Some(now().date_naive()));
    }

    #[test]
    fn test_approve_requires_pending_approval() {
        let assignee = Uuid::now_v7();
        let assigner = Uuid::now_v7();
        let t = tracker(assignee, Some(assigner));

        let err = t.approve(&Actor::member(assigner), now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[test]
    fn test_approve_checks_authorization_first() {
        let assignee = Uuid::now_v7();
        let t = tracker(assignee, Some(Uuid::now_v7()));

        // Wrong actor on a tracker in the wrong state: authorization wins.
        let err = t.approve(&Actor::member(assignee), now()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_any_admin_approves_without_assigner() {
        let assignee = Uuid::now_v7();
        let t = tracker(assignee, None);
        let pending = t.mark_done(&Actor::member(assignee), now()).unwrap().tracker;

        assert!(pending.approve(&Actor::member(Uuid::now_v7()), now()).is_err());
        let admin = Actor::admin(Uuid::now_v7());
        let done = pending.approve(&admin, now()).unwrap();
        assert_eq!(done.tracker.approved_by_id, Some(admin.id));
    }

    #[test]
    fn test_reinstate_only_from_pending_approval() {
        let assignee = Uuid::now_v7();
        let assigner = Actor::member(Uuid::now_v7());
        let t = tracker(assignee, Some(assigner.id));

        assert!(matches!(
            t.reinstate(&assigner, None, now()),
            Err(Error::InvalidState { .. })
        ));

        let waiting = t.mark_done(&Actor::member(assignee), now()).unwrap().tracker;
        let back = waiting
            .reinstate(&assigner, Some("Missed a spot".to_string()), now())
            .unwrap();
        assert_eq!(back.outcome, Outcome::Reinstated);
        assert_eq!(back.tracker.status, TrackerStatus::Pending);
        assert_eq!(back.tracker.assigner_notes.as_deref(), Some("Missed a spot"));

        let completed = waiting.approve(&assigner, now()).unwrap().tracker;
        assert!(matches!(
            completed.reinstate(&assigner, None, now()),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_skip_is_terminal() {
        let assigner = Actor::member(Uuid::now_v7());
        let t = tracker(Uuid::now_v7(), Some(assigner.id));

        let skipped = t.skip(&assigner, now()).unwrap().tracker;
        assert_eq!(skipped.status, TrackerStatus::Skipped);
        assert!(skipped.direct_complete(&assigner, now()).is_err());
        assert!(skipped.update_notes(&assigner, None, now()).is_err());
    }

    #[test]
    fn test_adhoc_assignment_rules() {
        let member = Actor::member(Uuid::now_v7());
        let input = AdHocTracker {
            title: "Walk the dog".to_string(),
            reward: 3,
            ..Default::default()
        };

        let own = Tracker::adhoc(input.clone(), &member, now()).unwrap();
        assert_eq!(own.assigned_user_id, Some(member.id));
        assert_eq!(own.approval_rule(), ApprovalRule::AnyAdministrator);

        let other = AdHocTracker {
            assigned_user_id: Some(Uuid::now_v7()),
            ..input
        };
        assert!(matches!(
            Tracker::adhoc(other, &member, now()),
            Err(Error::Unauthorized(_))
        ));
    }
}
