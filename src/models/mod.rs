pub mod package;
pub mod platform;
pub mod platform_user;
pub mod pppoe_entry;
pub mod pppoe_plan;
pub mod station;
pub mod subscriber;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::package::{self, Entity as Package};
    pub use super::platform::{self, Entity as Platform};
    pub use super::platform_user::{self, Entity as PlatformUser};
    pub use super::pppoe_entry::{self, Entity as PppoeEntry};
    pub use super::pppoe_plan::{self, Entity as PppoePlan};
    pub use super::station::{self, Entity as Station};
    pub use super::subscriber::{self, Entity as Subscriber};
}
