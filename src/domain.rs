mod new_subscriber;
mod subscriber_email;
mod subscriber_name;

pub use new_subscriber::{
    InvalidSubscriber, NewSubscriber, SubscriptionSource, ADMIN_SYNC_SOURCE, DEFAULT_SOURCE,
};
pub use subscriber_email::SubscriberEmail;
pub use subscriber_name::SubscriberName;
