use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    adapters::Filter,
    authz::Actor,
    completion::{CompletionEntry, EntryDetails, PayoutOutcome, TaskKey},
    engine::{Engine, trackers::observe_payout},
    error::{Error, Result},
    events::DomainEvent,
    ledger::Guard,
    object::{NewProject, Project, ProjectUpdate, User},
    reward,
};

impl Engine {
    // ==================== Projects ====================

    pub async fn create_project(&self, actor: &Actor, input: NewProject) -> Result<Project> {
        let project = Project::create(input, actor, self.now())?;
        self.ensure_users(&project.assignees).await?;
        self.insert(&project).await?;

        tracing::info!(project = %project.id, actor = %actor.id, "project created");
        Ok(project)
    }

    pub async fn fetch_project(&self, id: Uuid) -> Result<Project> {
        self.fetch::<Project>(id).await
    }

    pub async fn update_project(
        &self,
        actor: &Actor,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Project> {
        let project = self.fetch_project(id).await?;
        let next = project.apply(actor, update, self.now())?;
        if next.assignees != project.assignees {
            self.ensure_users(&next.assignees).await?;
        }

        let mut plan = self.plan();
        plan.update(&next, Some(Guard::Open))?;
        self.run(&plan, "project").await?;
        Ok(next)
    }

    /// Ask every assignee for more details.
    pub async fn request_project_details(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let project = self.fetch_project(id).await?;
        if project.assignees.is_empty() {
            return Err(Error::Validation("project has no assignees".to_string()));
        }

        tracing::info!(project = %project.id, actor = %actor.id, "project details requested");
        let recipients = project.assignees.clone();
        self.notify(DomainEvent::ProjectDetailsRequested {
            project,
            recipients,
        })
        .await;
        Ok(())
    }

    /// Complete a project and pay its reward to the primary assignee.
    /// Projects carry no due date, so there is no lateness penalty.
    pub async fn complete_project(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<(Project, Option<PayoutOutcome>)> {
        let project = self.fetch_project(id).await?;
        let next = project.complete(actor, self.now())?;

        let completed_date = next
            .completed_date
            .unwrap_or_else(|| self.clock().today());
        let assignee = next.primary_assignee();
        let details = EntryDetails {
            task_name: next.name.clone(),
            assigned_user_id: assignee,
            assigned_user_name: self.user_name(assignee).await?,
            approved_by: Some(actor.id),
            ..Default::default()
        };
        let entry = CompletionEntry::new(
            TaskKey::Project(next.id),
            completed_date,
            reward::calculate(next.reward, completed_date, completed_date, 0),
            details,
            self.now(),
        );

        let mut plan = self.plan();
        plan.update(&next, Some(Guard::Open))?;
        plan.payout(entry);
        let outcome = self.run(&plan, "project").await?;

        let payout = outcome.payouts.into_iter().next();
        if let Some(payout) = &payout {
            observe_payout(payout);
        }
        tracing::info!(project = %next.id, actor = %actor.id, "project completed");
        Ok((next, payout))
    }

    pub async fn delete_project(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let project = self.fetch_project(id).await?;
        project.authorize(actor, "delete this project")?;
        project.expect_open()?;

        let mut plan = self.plan();
        plan.delete::<Project>(id, Some(Guard::Open));
        self.run(&plan, "project").await?;

        tracing::info!(project = %id, actor = %actor.id, "project deleted");
        Ok(())
    }

    pub async fn open_projects(&self) -> Result<Vec<Project>> {
        self.query::<Project>(&[Filter::flag("completed", false)])
            .await
    }

    /// Completed projects grouped by completion date, newest first.
    pub async fn completed_projects_by_date(&self) -> Result<Vec<(NaiveDate, Vec<Project>)>> {
        let mut projects = self
            .query::<Project>(&[Filter::flag("completed", true)])
            .await?;
        projects.sort_by(|a, b| b.completed_date.cmp(&a.completed_date));

        let mut groups: Vec<(NaiveDate, Vec<Project>)> = Vec::new();
        for project in projects {
            let Some(date) = project.completed_date else {
                continue;
            };
            match groups.last_mut() {
                Some((current, group)) if *current == date => group.push(project),
                _ => groups.push((date, vec![project])),
            }
        }
        Ok(groups)
    }

    async fn ensure_users(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            self.fetch::<User>(*id).await?;
        }
        Ok(())
    }
}
