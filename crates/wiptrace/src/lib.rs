//! Repair-diagnostics scraping for the wareconn WIP portal.
//!
//! Given batches of device serial numbers exported from the WIP report,
//! this crate drives a browser session to look up each serial's service
//! history, classifies the scraped failure reason into an error-code/
//! description pair, and accumulates results into append-only CSV ledgers
//! that can be merged and cleaned afterwards. Ledgers double as the
//! resume point: re-running a batch skips everything already recorded.

pub mod batch;
pub mod cdp;
pub mod driver;
pub mod errors;
pub mod ledger;
pub mod orchestrator;
pub mod reason;
pub mod station;

pub use batch::SerialRecord;
pub use cdp::CdpDriver;
pub use driver::PortalDriver;
pub use errors::ScrapeError;
pub use ledger::{Ledger, ResultRow};
pub use orchestrator::{Orchestrator, Pacing, PortalConfig, RunSummary};
pub use reason::{parse_reason, ParsedError};
pub use station::{normalize_station, station_prefix};
