//! Workflow events and their delivery as user notifications.
//!
//! Delivery is fire-and-forget: the engine dispatches only after the
//! triggering plan has committed, and a failing sink is logged, never
//! propagated.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use uuid::Uuid;

use crate::{
    adapters::{Adapter, ObjectRecord},
    error::Result,
    object::{CashOutRequest, Notification, Project, Tracker},
};

#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn notify(&self, user: Uuid, message: &str, link: Option<&str>) -> Result<()>;
}

/// Default sink: persists a [`Notification`] record per message.
pub struct StoreNotifier {
    adapter: Arc<dyn Adapter>,
}

impl StoreNotifier {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl NotificationSink for StoreNotifier {
    async fn notify(&self, user: Uuid, message: &str, link: Option<&str>) -> Result<()> {
        let notification = Notification::new(user, message, link.map(str::to_string));
        self.adapter
            .insert_object(ObjectRecord::from_object(&notification, Utc::now())?)
            .await
    }
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A tracker was marked done and now waits for approval.
    CompletionRequested {
        tracker: Tracker,
        assignee_name: String,
        recipients: Vec<Uuid>,
    },
    Reinstated {
        tracker: Tracker,
        assigner_name: String,
        recipient: Uuid,
    },
    CashOutRequested {
        request: CashOutRequest,
        requester: String,
        recipients: Vec<Uuid>,
    },
    CashOutPaid {
        request: CashOutRequest,
    },
    ProjectDetailsRequested {
        project: Project,
        recipients: Vec<Uuid>,
    },
}

/// One message for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub user: Uuid,
    pub text: String,
    pub link: Option<String>,
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompletionRequested { .. } => "completion_requested",
            Self::Reinstated { .. } => "reinstated",
            Self::CashOutRequested { .. } => "cash_out_requested",
            Self::CashOutPaid { .. } => "cash_out_paid",
            Self::ProjectDetailsRequested { .. } => "project_details_requested",
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        match self {
            Self::CompletionRequested {
                tracker,
                assignee_name,
                recipients,
            } => {
                let text = if tracker.assigned_by_id.is_some() {
                    format!(
                        "\"{}\" has been marked as completed by {} and is pending your approval.",
                        tracker.title, assignee_name
                    )
                } else {
                    format!(
                        "\"{}\" has been marked as completed by {} and is pending approval.",
                        tracker.title, assignee_name
                    )
                };
                let link = format!("/dashboard?highlight_chore={}", tracker.id);
                fan_out(recipients, &text, Some(&link))
            }
            Self::Reinstated {
                tracker,
                assigner_name,
                recipient,
            } => {
                let mut text = format!(
                    "\"{}\" has been reinstated by {}.",
                    tracker.title, assigner_name
                );
                if let Some(notes) = &tracker.assigner_notes {
                    text.push_str(&format!(" Notes: {}", notes));
                }
                let link = format!("/dashboard?highlight_chore={}", tracker.id);
                fan_out(&[*recipient], &text, Some(&link))
            }
            Self::CashOutRequested {
                request,
                requester,
                recipients,
            } => {
                let text = format!(
                    "{} requested cash-out of {} tokens (${:.2}).",
                    requester, request.tokens, request.dollar_value
                );
                fan_out(recipients, &text, Some("/store/token-settings"))
            }
            Self::CashOutPaid { request } => {
                let text = format!(
                    "Your cash-out request of {} tokens (${:.2}) has been marked paid.",
                    request.tokens, request.dollar_value
                );
                fan_out(&[request.user_id], &text, Some("/store/cash-out"))
            }
            Self::ProjectDetailsRequested {
                project,
                recipients,
            } => {
                let text = format!(
                    "Project \"{}\" needs more details or clarification.",
                    project.name
                );
                let link = format!("/projects/?highlight={}", project.id);
                fan_out(recipients, &text, Some(&link))
            }
        }
    }
}

fn fan_out(recipients: &[Uuid], text: &str, link: Option<&str>) -> Vec<Message> {
    recipients
        .iter()
        .map(|user| Message {
            user: *user,
            text: text.to_string(),
            link: link.map(str::to_string),
        })
        .collect()
}

/// Deliver every message of `event`. Failures are logged and counted.
pub async fn dispatch(sink: &dyn NotificationSink, event: &DomainEvent) {
    for message in event.messages() {
        match sink
            .notify(message.user, &message.text, message.link.as_deref())
            .await
        {
            Ok(()) => {
                counter!("chorebank.notifications.total", "status" => "sent").increment(1);
            }
            Err(err) => {
                counter!("chorebank.notifications.total", "status" => "failed").increment(1);
                tracing::warn!(
                    event = event.name(),
                    user = %message.user,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
}
