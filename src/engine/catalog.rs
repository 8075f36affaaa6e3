use uuid::Uuid;

use crate::{
    adapters::Filter,
    authz::{Actor, require_admin},
    engine::Engine,
    error::Result,
    ledger::Guard,
    object::{
        NewStoreItem, NewTemplate, Room, StoreItem, StoreItemUpdate, TaskTemplate,
        TemplateUpdate, Tracker, TrackerStatus, catalog::required_text,
    },
};

impl Engine {
    // ==================== Rooms ====================

    pub async fn create_room(&self, actor: &Actor, name: &str) -> Result<Room> {
        require_admin(actor, "manage rooms")?;
        let mut room = Room::new(required_text(name, "room name")?);
        room.created_at = self.now();
        self.insert(&room).await?;
        Ok(room)
    }

    pub async fn rename_room(&self, actor: &Actor, id: Uuid, name: &str) -> Result<Room> {
        require_admin(actor, "manage rooms")?;
        let mut room = self.fetch::<Room>(id).await?;
        room.name = required_text(name, "room name")?;
        self.save(&room).await?;
        Ok(room)
    }

    /// Completion entries keep the room name they were written with.
    pub async fn delete_room(&self, actor: &Actor, id: Uuid) -> Result<()> {
        require_admin(actor, "manage rooms")?;
        self.remove::<Room>(id).await
    }

    pub async fn rooms(&self) -> Result<Vec<Room>> {
        self.list::<Room>().await
    }

    // ==================== Templates ====================

    pub async fn create_template(&self, actor: &Actor, input: NewTemplate) -> Result<TaskTemplate> {
        require_admin(actor, "manage chores")?;
        let mut template = TaskTemplate::create(input, actor.id)?;
        template.created_at = self.now();
        self.insert(&template).await?;

        tracing::info!(template = %template.id, admin = %actor.id, "template created");
        Ok(template)
    }

    pub async fn update_template(
        &self,
        actor: &Actor,
        id: Uuid,
        update: TemplateUpdate,
    ) -> Result<TaskTemplate> {
        require_admin(actor, "manage chores")?;
        let mut template = self.fetch::<TaskTemplate>(id).await?;
        template.apply(update, actor.id)?;
        self.save(&template).await?;
        Ok(template)
    }

    /// Delete a template together with its open trackers. Completed trackers
    /// are history: they stay, detached from the template.
    pub async fn delete_template(&self, actor: &Actor, id: Uuid) -> Result<()> {
        require_admin(actor, "manage chores")?;
        self.fetch::<TaskTemplate>(id).await?;

        let trackers = self
            .query::<Tracker>(&[Filter::uuid("template_id", id)])
            .await?;

        let mut plan = self.plan();
        let mut detached = 0usize;
        for tracker in &trackers {
            let guard = Some(Guard::Status(tracker.status.as_str()));
            if tracker.status == TrackerStatus::Completed {
                let mut kept = tracker.clone();
                kept.template_id = None;
                plan.update(&kept, guard)?;
                detached += 1;
            } else {
                plan.delete::<Tracker>(tracker.id, guard);
            }
        }
        plan.delete::<TaskTemplate>(id, None);
        self.run(&plan, "template").await?;

        tracing::info!(
            template = %id,
            admin = %actor.id,
            deleted = trackers.len() - detached,
            detached,
            "template deleted"
        );
        Ok(())
    }

    pub async fn templates(&self) -> Result<Vec<TaskTemplate>> {
        self.list::<TaskTemplate>().await
    }

    // ==================== Store items ====================

    pub async fn create_store_item(&self, actor: &Actor, input: NewStoreItem) -> Result<StoreItem> {
        require_admin(actor, "manage the store")?;
        let mut item = StoreItem::create(input)?;
        item.created_at = self.now();
        self.insert(&item).await?;
        Ok(item)
    }

    pub async fn update_store_item(
        &self,
        actor: &Actor,
        id: Uuid,
        update: StoreItemUpdate,
    ) -> Result<StoreItem> {
        require_admin(actor, "manage the store")?;
        let mut item = self.fetch::<StoreItem>(id).await?;
        item.apply(update)?;
        self.save(&item).await?;
        Ok(item)
    }

    /// Past purchases keep their own copy of title and cost.
    pub async fn delete_store_item(&self, actor: &Actor, id: Uuid) -> Result<()> {
        require_admin(actor, "manage the store")?;
        self.remove::<StoreItem>(id).await
    }

    /// Active items by `sort_order`; administrators also see inactive ones.
    pub async fn list_store_items(&self, actor: &Actor) -> Result<Vec<StoreItem>> {
        let mut items = self.list::<StoreItem>().await?;
        if !actor.is_admin {
            items.retain(|item| item.active);
        }
        // Stable sort keeps creation order within equal sort_order
        items.sort_by_key(|item| item.sort_order);
        Ok(items)
    }
}
