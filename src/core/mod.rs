pub mod orders;
pub mod scanner;
pub mod scheduler;

pub use orders::{order_file_name, OrderReport, PaymentOrderSync};
pub use scanner::{FileMarker, FileScanner, ScanConfig, ScanReport};
pub use scheduler::{PassReport, Scheduler, PASS_INTERVAL};
