//! Remote layout and snapshot file naming.
//!
//! Snapshot names embed a fixed-width `YYYYMMDD` date, so comparing the date
//! strings lexicographically orders them chronologically.

use chrono::{Days, NaiveDate};

/// Well-known directory snapshots are uploaded to.
pub const BACKUP_DIR: &str = "/nav-backup";

pub const ROOT_DIR: &str = "/";

/// Scanned in this order by listing and retention. The root holds snapshots
/// written before the directory existed.
pub const SCAN_LOCATIONS: [&str; 2] = [BACKUP_DIR, ROOT_DIR];

pub const FILENAME_PREFIX: &str = "nav-dashboard-backup-";
pub const FILENAME_SUFFIX: &str = ".json";

const DATE_FORMAT: &str = "%Y%m%d";

pub fn date_stamp(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn snapshot_filename(date: NaiveDate) -> String {
    format!("{FILENAME_PREFIX}{}{FILENAME_SUFFIX}", date_stamp(date))
}

/// Returns the embedded date stamp when `name` is a snapshot filename.
pub fn snapshot_date(name: &str) -> Option<&str> {
    let stamp = name
        .strip_prefix(FILENAME_PREFIX)?
        .strip_suffix(FILENAME_SUFFIX)?;
    (stamp.len() == 8 && stamp.bytes().all(|b| b.is_ascii_digit())).then_some(stamp)
}

pub fn is_snapshot_filename(name: &str) -> bool {
    snapshot_date(name).is_some()
}

/// `<dir>/<name>`, without doubling the slash for the root.
pub fn remote_path(dir: &str, name: &str) -> String {
    if dir == ROOT_DIR {
        format!("/{name}")
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

/// Date stamp below which snapshots are retired. `None` when the window
/// reaches past the earliest representable date, so nothing can expire.
pub fn retention_cutoff(today: NaiveDate, keep_days: u32) -> Option<String> {
    today
        .checked_sub_days(Days::new(u64::from(keep_days)))
        .map(date_stamp)
}

pub fn is_expired(name: &str, cutoff: &str) -> bool {
    snapshot_date(name).is_some_and(|stamp| stamp < cutoff)
}
