mod config_store;
pub mod postgres_store;
pub mod sqlite_store;
pub mod store;

pub use config_store::{
    ConfigStore, KEY_FREQUENCY, KEY_LAST_STATUS, KEY_LAST_TIME, KEY_PASSWORD, KEY_URL,
    KEY_USERNAME,
};
pub use store::{open_store, SiteStore};
