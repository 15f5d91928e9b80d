//! Export log and cursor tracking

pub mod cursor;
pub mod manager;

pub use cursor::{CursorValue, ExportCursor, ExportCursorBuilder, ExportStatus};
pub use manager::ExportLog;
