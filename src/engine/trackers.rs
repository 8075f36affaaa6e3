use chrono::NaiveDate;
use metrics::{counter, histogram};
use uuid::Uuid;

use crate::{
    adapters::Filter,
    authz::{Actor, require_admin},
    completion::{CompletionEntry, EntryDetails, PayoutOutcome, TaskKey},
    engine::Engine,
    error::{Error, Result},
    events::DomainEvent,
    ledger::Guard,
    object::{
        AdHocTracker, NewTracker, Outcome, Room, TaskTemplate, Tracker, TrackerStatus, Transition,
    },
    reward,
    settings::Settings,
};

/// Result of a tracker transition.
#[derive(Debug, Clone)]
pub struct TrackerUpdate {
    pub tracker: Tracker,
    pub outcome: Outcome,
    /// Set when the transition completed the tracker.
    pub payout: Option<PayoutOutcome>,
}

impl TrackerUpdate {
    /// Tokens credited by this call; zero when nothing was paid or the
    /// completion had already been recorded.
    pub fn credited(&self) -> u64 {
        match &self.payout {
            Some(PayoutOutcome::Recorded(entry)) if entry.assigned_user_id.is_some() => {
                entry.amount
            }
            _ => 0,
        }
    }
}

impl Engine {
    // ==================== Scheduling ====================

    pub async fn schedule(
        &self,
        actor: &Actor,
        template_id: Uuid,
        input: NewTracker,
    ) -> Result<Tracker> {
        require_admin(actor, "schedule chores")?;
        let template = self.fetch::<TaskTemplate>(template_id).await?;

        let tracker = Tracker::scheduled(&template, input, actor.id, self.now());
        self.insert(&tracker).await?;

        tracing::info!(
            tracker = %tracker.id,
            template = %template.id,
            date = %tracker.date,
            "chore scheduled"
        );
        Ok(tracker)
    }

    pub async fn log_adhoc(&self, actor: &Actor, input: AdHocTracker) -> Result<Tracker> {
        let tracker = Tracker::adhoc(input, actor, self.now())?;
        self.insert(&tracker).await?;

        tracing::info!(tracker = %tracker.id, actor = %actor.id, "ad-hoc chore logged");
        Ok(tracker)
    }

    pub async fn fetch_tracker(&self, id: Uuid) -> Result<Tracker> {
        self.fetch::<Tracker>(id).await
    }

    pub async fn trackers_with_status(&self, status: TrackerStatus) -> Result<Vec<Tracker>> {
        self.query::<Tracker>(&[Filter::text("status", status.as_str())])
            .await
    }

    pub async fn trackers_assigned_to(&self, user: Uuid) -> Result<Vec<Tracker>> {
        self.query::<Tracker>(&[Filter::uuid("assigned_user_id", user)])
            .await
    }

    // ==================== Transitions ====================

    pub async fn mark_done(&self, actor: &Actor, tracker_id: Uuid) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.mark_done(actor, self.now())?;
        let update = self.commit_transition(actor, transition).await?;

        if update.outcome == Outcome::AwaitingApproval {
            let recipients = match update.tracker.assigned_by_id {
                Some(assigner) if assigner != actor.id => vec![assigner],
                Some(_) => Vec::new(),
                None => self.other_administrators(actor.id).await,
            };
            let assignee_name = self
                .display_name(update.tracker.assigned_user_id, "Someone")
                .await;

            self.notify(DomainEvent::CompletionRequested {
                tracker: update.tracker.clone(),
                assignee_name,
                recipients,
            })
            .await;
        }

        Ok(update)
    }

    pub async fn approve(&self, actor: &Actor, tracker_id: Uuid) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.approve(actor, self.now())?;
        self.commit_transition(actor, transition).await
    }

    pub async fn reinstate(
        &self,
        actor: &Actor,
        tracker_id: Uuid,
        notes: Option<String>,
    ) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.reinstate(actor, notes, self.now())?;
        let update = self.commit_transition(actor, transition).await?;

        if let Some(assignee) = update.tracker.assigned_user_id.filter(|id| *id != actor.id) {
            let reinstated_by = update.tracker.assigned_by_id.unwrap_or(actor.id);
            let assigner_name = self.display_name(Some(reinstated_by), "Admin").await;

            self.notify(DomainEvent::Reinstated {
                tracker: update.tracker.clone(),
                assigner_name,
                recipient: assignee,
            })
            .await;
        }

        Ok(update)
    }

    pub async fn direct_complete(&self, actor: &Actor, tracker_id: Uuid) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.direct_complete(actor, self.now())?;
        self.commit_transition(actor, transition).await
    }

    pub async fn skip(&self, actor: &Actor, tracker_id: Uuid) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.skip(actor, self.now())?;
        self.commit_transition(actor, transition).await
    }

    pub async fn update_notes(
        &self,
        actor: &Actor,
        tracker_id: Uuid,
        notes: Option<String>,
    ) -> Result<TrackerUpdate> {
        let tracker = self.fetch_tracker(tracker_id).await?;
        let transition = tracker.update_notes(actor, notes, self.now())?;
        self.commit_transition(actor, transition).await
    }

    // ==================== Completion ledger ====================

    /// Record a completion and credit its assignee, at most once per task
    /// and date. A repeat is reported, not treated as an error.
    pub async fn record_completion(
        &self,
        task: TaskKey,
        completed_date: NaiveDate,
        reward: reward::Reward,
        details: EntryDetails,
    ) -> Result<PayoutOutcome> {
        let entry = CompletionEntry::new(task, completed_date, reward, details, self.now());

        let mut plan = self.plan();
        plan.payout(entry);
        let outcome = self.run(&plan, "completion").await?;

        let payout = outcome
            .first_payout()
            .cloned()
            .ok_or_else(|| Error::Storage("payout produced no outcome".to_string()))?;
        observe_payout(&payout);
        Ok(payout)
    }

    pub async fn find_completion(
        &self,
        task: TaskKey,
        completed_date: NaiveDate,
    ) -> Result<Option<CompletionEntry>> {
        self.adapter().find_completion(&task, completed_date).await
    }

    pub async fn completions(&self) -> Result<Vec<CompletionEntry>> {
        self.adapter().fetch_completions().await
    }

    /// Completion history grouped by date, newest date first.
    pub async fn completions_by_date(&self) -> Result<Vec<(NaiveDate, Vec<CompletionEntry>)>> {
        let mut groups: Vec<(NaiveDate, Vec<CompletionEntry>)> = Vec::new();
        let mut entries = self.completions().await?;
        entries.sort_by(|a, b| b.completed_date.cmp(&a.completed_date));

        for entry in entries {
            match groups.last_mut() {
                Some((date, group)) if *date == entry.completed_date => group.push(entry),
                _ => groups.push((entry.completed_date, vec![entry])),
            }
        }
        Ok(groups)
    }

    // ==================== Internals ====================

    /// Persist a transition with a compare-and-set on the status it left,
    /// paying out in the same plan when it completes the tracker.
    async fn commit_transition(&self, actor: &Actor, transition: Transition) -> Result<TrackerUpdate> {
        let Transition {
            from,
            tracker,
            outcome,
        } = transition;

        let mut plan = self.plan();
        plan.update(&tracker, Some(Guard::Status(from.as_str())))?;

        if outcome == Outcome::Completed {
            let settings = self.settings().await?;
            plan.payout(self.completion_entry(&tracker, &settings).await?);
        }

        let result = self.run(&plan, "tracker").await?;
        let payout = result.payouts.into_iter().next();
        if let Some(payout) = &payout {
            observe_payout(payout);
        }

        counter!("chorebank.transition.total", "to" => tracker.status.as_str()).increment(1);
        tracing::info!(
            tracker = %tracker.id,
            actor = %actor.id,
            from = %from,
            to = %tracker.status,
            "tracker transition"
        );

        Ok(TrackerUpdate {
            tracker,
            outcome,
            payout,
        })
    }

    async fn completion_entry(
        &self,
        tracker: &Tracker,
        settings: &Settings,
    ) -> Result<CompletionEntry> {
        let completed_date = tracker.completed_on.unwrap_or_else(|| self.clock().today());
        let reward = reward::calculate(
            tracker.reward,
            tracker.due_date(),
            completed_date,
            settings.penalty_per_day,
        );

        let room_name = match tracker.room_id {
            Some(room) => self.fetch_opt::<Room>(room).await?.map(|r| r.name),
            None => None,
        };

        let details = EntryDetails {
            template_id: tracker.template_id,
            task_name: tracker.title.clone(),
            assigned_user_id: tracker.assigned_user_id,
            assigned_user_name: self.user_name(tracker.assigned_user_id).await?,
            room_id: tracker.room_id,
            room_name,
            frequency: tracker.frequency.clone(),
            approved_by: tracker.approved_by_id,
        };

        Ok(CompletionEntry::new(
            TaskKey::Tracker(tracker.id),
            completed_date,
            reward,
            details,
            self.now(),
        ))
    }
}

pub(crate) fn observe_payout(payout: &PayoutOutcome) {
    match payout {
        PayoutOutcome::Recorded(entry) => {
            histogram!("chorebank.payout.amount").record(entry.amount as f64);
            tracing::info!(
                task = %entry.task,
                date = %entry.completed_date,
                amount = entry.amount,
                days_late = entry.days_late,
                "completion recorded"
            );
        }
        PayoutOutcome::AlreadyRecorded(entry) => {
            counter!("chorebank.payout.duplicate").increment(1);
            tracing::warn!(
                task = %entry.task,
                date = %entry.completed_date,
                "completion already recorded, payout skipped"
            );
        }
    }
}
