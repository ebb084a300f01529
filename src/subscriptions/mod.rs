//! Change notification for state mutations.
//!
//! Every field write produces one [`ChangeNotice`], delivered synchronously
//! to each registered [`Subscriber`] in registration order. A subscriber
//! that fails or panics is logged and skipped; it never reaches the writer
//! and never blocks the subscribers after it.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = SubscriberRegistry::new();
//!
//! let (subscriber, notices) = ChannelSubscriber::new(64);
//! registry.register(Arc::new(subscriber));
//!
//! registry.notify_all(&ChangeNotice::new(StateField::Count, json!(5)));
//!
//! let notice = notices.recv()?;
//! assert_eq!(notice.field_name(), "Count");
//! ```

mod registry;
mod types;

pub use registry::{NotifyReport, SubscriberRegistry};
pub use types::{
    subscriber_fn, ChangeNotice, ChannelSubscriber, FnSubscriber, NoticeReceiver, Subscriber,
};
