pub mod context;
pub mod coordinator;
pub mod log;
pub mod names;

pub use context::RollingContext;
pub use coordinator::{Session, SessionError};
pub use log::{read_log, LogEntry, LogError, LogOrigin, SessionLog};
pub use names::{NameCache, NameResolver, NullResolver};
