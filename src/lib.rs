//! # Chorebank
//!
//! Chorebank tracks household chores and one-off projects, routes their
//! completion through an approval workflow, and pays out tokens that can be
//! spent in a store or cashed out.
//!
//! ## What's inside
//!
//! ### Approval workflow
//! Every chore occurrence (a *tracker*) moves through
//! `pending → pending_approval → completed`, with `reinstate` sending it back
//! and `skip` retiring it. Who may do what is decided before the current
//! status is looked at, so `Unauthorized` and `InvalidState` never blur.
//!
//! ### Exactly-once payouts
//! A completion is written to the completion ledger keyed by
//! `(task, completion date)` in the same transaction that flips the status
//! and credits the assignee. Two administrators approving at once produce one
//! entry and one credit; the loser sees `InvalidState`.
//!
//! ### Token economy
//! Balances are never negative. Purchases and cash-outs debit inside the
//! same plan that records them, so a failed debit leaves nothing behind.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chorebank::{Engine, adapters::memory::MemoryAdapter};
//!
//! let engine = Engine::new(Box::new(MemoryAdapter::new()));
//! let admin = engine.create_user("Pat", true).await?.actor();
//! let kid = engine.create_user("Sam", false).await?;
//!
//! let tracker = engine.log_adhoc(&admin, AdHocTracker {
//!     title: "Dishes".into(),
//!     reward: 10,
//!     assigned_user_id: Some(kid.id),
//!     ..Default::default()
//! }).await?;
//!
//! engine.mark_done(&kid.actor(), tracker.id).await?;
//! engine.approve(&admin, tracker.id).await?;
//! assert_eq!(engine.balance(kid.id).await?.available, 10);
//! ```
//!
//! ## Feature flags
//!
//! | Flag     | Default | Description                        |
//! |----------|---------|------------------------------------|
//! | `sqlite` | ✓       | SQLite adapter (in-memory or file) |

pub mod adapters;
pub mod authz;
pub mod clock;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod object;
pub mod reward;
pub mod settings;

pub use crate::adapters::{Adapter, Filter, ObjectRecord};
pub use crate::authz::{Actor, ApprovalRule};
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::completion::{CompletionEntry, EntryDetails, PayoutOutcome, TaskKey};
pub use crate::config::Config;
pub use crate::engine::{Engine, EngineBuilder, TrackerUpdate};
pub use crate::error::{Error, Result};
pub use crate::events::{DomainEvent, NotificationSink, StoreNotifier};
pub use crate::ledger::{Adjustment, Balance, Transaction, TransactionKind};
pub use crate::object::*;
pub use crate::reward::Reward;
pub use crate::settings::{SettingDefaults, Settings, SettingsUpdate, parse_tokens};
