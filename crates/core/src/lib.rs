pub mod backup;
pub mod hash;
pub mod naming;
pub mod snapshot;

pub use backup::{
    BackupConfig, BackupConfigUpdate, BackupFileRef, BackupOutcome, Credentials, Frequency,
    RestoreOutcome,
};
pub use hash::content_hash;
pub use snapshot::{Category, Site, SnapshotDocument, FORMAT_VERSION, SECRET_KEYS};
