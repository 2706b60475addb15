pub mod config;
mod connection;
mod engine;
mod error;
mod restore;
pub mod retention;
pub mod scheduler;
mod server;
mod session;
mod snapshot;

pub use connection::ConnectionCheck;
pub use engine::{BackupEngine, EngineSettings, DEFAULT_KEEP_DAYS, DEFAULT_TRANSPORT_TIMEOUT};
pub use error::EngineError;
pub use scheduler::{ScheduleState, Scheduler};
pub use server::{build_router, AppState};
pub use session::Session;
pub use snapshot::Snapshotter;
