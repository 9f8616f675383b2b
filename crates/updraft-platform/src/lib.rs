//! Host integration: application directories, persisted updater state and
//! connectivity probing.

mod connectivity;
mod fs;
mod paths;
mod state;

pub use connectivity::{AlwaysConnected, DEFAULT_REACHABILITY_ADDRESSES, TcpReachability};
pub use fs::write_atomic;
pub use paths::{AppPaths, AppPathsError};
pub use state::{JsonFileStore, MemoryStore, StateError, StateStore, UpdaterState};
