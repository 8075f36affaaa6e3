use uuid::Uuid;

use crate::{
    adapters::Filter,
    authz::Actor,
    engine::Engine,
    error::{Error, Result},
    object::{Notification, Object},
};

const NOTIFICATION_LIMIT: usize = 100;

impl Engine {
    // ==================== Notifications ====================

    /// Newest first, at most 100.
    pub async fn notifications(&self, user: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let mut filters = vec![Filter::uuid("user_id", user)];
        if unread_only {
            filters.push(Filter::flag("read", false));
        }

        let mut notifications = self.query::<Notification>(&filters).await?;
        notifications.reverse();
        notifications.truncate(NOTIFICATION_LIMIT);
        Ok(notifications)
    }

    pub async fn unread_count(&self, user: Uuid) -> Result<usize> {
        Ok(self
            .query::<Notification>(&[Filter::uuid("user_id", user), Filter::flag("read", false)])
            .await?
            .len())
    }

    pub async fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification> {
        let notification = self
            .fetch_opt::<Notification>(id)
            .await?
            .filter(|n| n.user_id == actor.id)
            .ok_or_else(|| Error::not_found(Notification::TYPE, id))?;

        if notification.read {
            return Ok(notification);
        }
        let read = notification.mark_read();
        self.save(&read).await?;
        Ok(read)
    }
}
