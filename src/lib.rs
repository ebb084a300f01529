//! # Application State
//!
//! An in-memory state container for component-based UIs, with change
//! notification for descendant components and persistence of a snapshot to
//! a key-value store.
//!
//! ## Core Concepts
//!
//! - **Container**: Owns the application fields (`message`, `count`,
//!   `counter`); every write redraws, notifies and persists
//! - **Subscribers**: Receive one change notice per write, in registration
//!   order; a failing subscriber never affects the others
//! - **Snapshots**: JSON records stamped with their save time, restored on
//!   first activation only while fresh (60 seconds by default)
//! - **Gateways**: Pluggable key-value storage (in-memory or file-backed)
//!
//! ## Example
//!
//! ```ignore
//! use app_state::{ContainerConfig, FileGateway, StateContainer};
//!
//! let gateway = Arc::new(FileGateway::new("./app-state")?);
//! let mut state = StateContainer::new(ContainerConfig::default(), gateway, || ui.redraw())?;
//!
//! // Restore whatever was saved in the last minute
//! state.activate()?;
//!
//! // Notifies subscribers and queues a write
//! state.set_count(5);
//! ```

pub mod clock;
pub mod container;
pub mod error;
pub mod persist;
pub mod storage;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use container::{
    ContainerConfig, FieldUpdate, LoadOutcome, RedrawSignal, StateContainer,
    DEFAULT_FRESHNESS_WINDOW, DEFAULT_STORAGE_KEY,
};
pub use error::{GatewayError, LoadError, Result, StateError, SubscriberError};
pub use persist::{PersistStats, PersistWorker};
pub use storage::{FileGateway, MemoryGateway, PersistenceGateway};
pub use subscriptions::{
    subscriber_fn, ChangeNotice, ChannelSubscriber, FnSubscriber, NoticeReceiver, NotifyReport,
    Subscriber, SubscriberRegistry,
};
pub use types::{CounterState, RestorableState, StateField, StateSnapshot};
