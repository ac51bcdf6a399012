//! BLE connection management.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ConnectionSupervisor                    │
//! │   (owns both client handles and both device records)     │
//! └───────────┬─────────────────────────────┬───────────────┘
//!             │                             │
//!             ▼                             ▼
//!     ┌───────────────┐            ┌────────────────┐
//!     │ DiscoveryScanner│          │   Transport    │
//!     │                │           │                │
//!     │ - role matching│           │ - scan         │
//!     │ - device records│          │ - connect      │
//!     │ - early stop   │           │ - callbacks    │
//!     └───────────────┘            └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Traits over the underlying wireless stack
//! - [`scanner`] - Device discovery and role matching
//! - [`supervisor`] - Per-role connection lifecycles
//! - [`sim`] - In-memory transport for tests and the demo binary

pub mod scanner;
pub mod sim;
pub mod supervisor;
pub mod transport;

pub use supervisor::ConnectionSupervisor;
