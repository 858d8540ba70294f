//! Application use cases

pub mod classify;
pub mod dedup;
pub mod poll;
pub mod render;
pub mod resolve;
pub mod scheduler;
pub mod subscriptions;

pub use classify::{ClassifyError, classify};
pub use dedup::{DedupGate, RecentClaims};
pub use poll::{MAX_PAGE_SIZE, PollError, Poller, PollerConfig};
pub use render::{RenderConfig, Renderer};
pub use resolve::SubscriptionResolver;
pub use scheduler::{PollScheduler, SchedulerHandle};
pub use subscriptions::{
    AccountRef, ListedSubscription, RemoveOutcome, SubscribeOutcome, SubscriptionError,
    SubscriptionService,
};
