//! In-process publish/subscribe for build progress.
//!
//! Publishers never wait on subscribers. Each subscriber has its own
//! unbounded queue, sees only events published after it subscribed, and
//! receives them in publication order.

mod bus;
mod types;

pub use bus::{EventBus, EventSubscription};
pub use types::{BuildEvent, EventKind};
