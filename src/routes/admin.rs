mod sync_subscriptions;

pub use sync_subscriptions::*;
