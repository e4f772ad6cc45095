pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod remote;

pub use config::{CentralConfig, DirectoryConfig, DirectorySet, DirectorySource};
pub use crate::core::{FileScanner, PassReport, PaymentOrderSync, Scheduler};
pub use error::SyncError;
pub use remote::{AccountingApi, ClientOptions, FlexiClient};
