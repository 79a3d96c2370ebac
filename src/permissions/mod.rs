//! Permission handling for agent tool calls
//!
//! The [`PermissionBroker`] decides each permission request in this order,
//! first match wins:
//!
//! 1. global bypass is on → allowed
//! 2. session is in `auto` mode → allowed
//! 3. session is in `plan` mode → denied
//! 4. an [`AllowList`] rule covers the invocation → allowed
//! 5. otherwise the request stays pending until the user resolves it

pub mod allow_list;
mod broker;

pub use allow_list::{AllowList, command_of, derive_rule};
pub use broker::{AutoReason, Evaluation, PermissionBroker};
