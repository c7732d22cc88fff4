// src/fetch/mod.rs
//
// Hand-off between the portal's browser-driven export and the CSV
// processing: the browser drops a file into the download directory, this
// module notices it, files it under the run's output directory, and knows
// which report statuses and date window the export was filtered by.

pub mod collect;
pub mod report;
pub mod wait;

pub use collect::{collect, Collected};
pub use report::{
    archive_download, archive_name, merged_name, report_window, ReportStatus, ReportWindow,
};
pub use wait::{wait_for_file, DownloadWatcher};
