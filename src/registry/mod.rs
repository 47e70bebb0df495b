//! Shared relay state
//!
//! The registry owns the four authoritative maps: known streampoints,
//! known users, the single producer slot per streampoint, and the listener
//! entries per streampoint. Mutations are atomic with respect to each
//! other; callers never see the lock.
//!
//! ```text
//!                         Arc<Registry>
//!                 ┌───────────────────────────┐
//!                 │ streampoints: HashSet     │
//!                 │ users: HashMap            │
//!                 │ sources: HashMap<Slot>    │
//!                 │ listeners: HashMap<Map>   │
//!                 └────────────┬──────────────┘
//!                              │ one Mutex
//!        ┌─────────────────────┼─────────────────────┐
//!        ▼                     ▼                     ▼
//!   [SourceSession]     [BroadcastDispatcher]   [AdminServer]
//!   register/touch/     listener_snapshot()    add/remove +
//!   drop_source()       remove_listener()      listings
//! ```

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{ListenerAuth, ListenerEntry, ProducerSlot, StreampointInfo, UserInfo, UserRecord};
pub use error::RegistryError;
pub use store::{ConfigPersist, NoPersist, Registry};
