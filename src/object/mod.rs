pub mod catalog;
pub mod meta;
pub mod notification;
pub mod project;
pub mod store;
pub mod tracker;
pub mod user;

pub use catalog::*;
pub use meta::*;
pub use notification::*;
pub use project::*;
pub use store::*;
pub use tracker::*;
pub use user::*;

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A persisted domain record.
///
/// `TYPE` is the discriminator adapters store records under; it must never
/// change once data has been written.
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE: &'static str;

    fn id(&self) -> Uuid;

    fn type_name(&self) -> &'static str {
        Self::TYPE
    }
}

macro_rules! impl_object {
    ($ty:ty, $name:literal) => {
        impl $crate::object::Object for $ty {
            const TYPE: &'static str = $name;

            fn id(&self) -> ::uuid::Uuid {
                self.id
            }
        }
    };
}

pub(crate) use impl_object;
