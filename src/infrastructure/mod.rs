//! Infrastructure layer. Transport-facing code, status output, and logging.

pub mod ble;
pub mod diagnostics;
pub mod indicator;
pub mod logging;
