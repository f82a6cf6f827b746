//! Per-serial lookup orchestration.
//!
//! One serial is fully processed before the next begins: navigate to the
//! summary page, submit the serial, follow the detail ("eyeball") link,
//! open the service record, scan the diagnostic table for the first
//! fail row at the record's repair station, and parse its reason cell.
//! Whatever happens, every attempted serial ends with exactly one ledger
//! append — a parsed result, the `Unknown` sentinel, or an `Error` row.

use std::time::Duration;

use tracing::{info, warn};

use crate::batch::SerialRecord;
use crate::driver::{resolve_href, PortalDriver};
use crate::errors::ScrapeError;
use crate::ledger::{Ledger, ResultRow};
use crate::reason::{parse_reason, ParsedError};
use crate::station::normalize_station;

pub const SUMMARY_URL: &str = "https://wareconn.com/r/Summary/pctls";
pub const LOGIN_URL: &str = "https://wareconn.com/Login";

const SERIAL_INPUT: &str = r#"[name="ppid"]"#;
const DETAIL_LINKS: &str = "a:has(i.fa-eye)";
const SERVICE_RECORD_BUTTONS: &str = "a.btn-info";
const SERVICE_RECORD_LABEL: &str = "Service Record";
const RECORD_TABLE: &str = "table.table-striped";
const SERIAL_INPUT_TIMEOUT: Duration = Duration::from_secs(20);
const SERVICE_RECORD_TIMEOUT: Duration = Duration::from_secs(10);
const TABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed waits between portal interactions. The portal reloads its tables
/// via slow server round-trips, so each step gives the page a moment to
/// settle before the next read.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub after_navigate: Duration,
    pub after_submit: Duration,
    pub before_service_record: Duration,
    pub after_service_record: Duration,
    pub before_table_scan: Duration,
    pub after_expand: Duration,
    pub between_serials: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            after_navigate: Duration::from_secs(2),
            after_submit: Duration::from_secs(8),
            before_service_record: Duration::from_secs(8),
            after_service_record: Duration::from_secs(3),
            before_table_scan: Duration::from_secs(3),
            after_expand: Duration::from_secs(3),
            between_serials: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    /// Zero-wait pacing for tests and scripted drivers.
    pub fn none() -> Self {
        Pacing {
            after_navigate: Duration::ZERO,
            after_submit: Duration::ZERO,
            before_service_record: Duration::ZERO,
            after_service_record: Duration::ZERO,
            before_table_scan: Duration::ZERO,
            after_expand: Duration::ZERO,
            between_serials: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub summary_url: String,
    pub login_url: String,
    pub pacing: Pacing,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            summary_url: SUMMARY_URL.to_string(),
            login_url: LOGIN_URL.to_string(),
            pacing: Pacing::default(),
        }
    }
}

/// What a whole batch run did, for the final summary line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Orchestrator<'a, D: PortalDriver> {
    driver: &'a D,
    config: PortalConfig,
}

impl<'a, D: PortalDriver> Orchestrator<'a, D> {
    pub fn new(driver: &'a D, config: PortalConfig) -> Self {
        Orchestrator { driver, config }
    }

    /// Runs every not-yet-processed serial of `batch` against `ledger`,
    /// strictly one at a time. Per-serial failures are recorded and do not
    /// abort the batch.
    pub async fn run_batch(
        &self,
        batch: &[SerialRecord],
        ledger: &mut Ledger,
    ) -> Result<RunSummary, ScrapeError> {
        let mut summary = RunSummary::default();

        let pending: Vec<&SerialRecord> = batch
            .iter()
            .filter(|record| {
                let processed = ledger.is_processed(&record.serial_number);
                if processed {
                    info!(serial = %record.serial_number, "Already processed, skipping");
                    summary.skipped += 1;
                }
                !processed
            })
            .collect();

        if pending.is_empty() {
            info!("All serials in this batch have already been processed");
            return Ok(summary);
        }
        info!(
            pending = pending.len(),
            total = batch.len(),
            ledger = %ledger.path().display(),
            "Starting batch run"
        );

        for (i, record) in pending.iter().enumerate() {
            info!(
                serial = %record.serial_number,
                position = i + 1,
                of = pending.len(),
                "Processing serial"
            );
            summary.attempted += 1;

            let row = match self.lookup(record).await {
                Ok(parsed) => {
                    summary.succeeded += 1;
                    info!(
                        serial = %record.serial_number,
                        code = %parsed.code,
                        description = %parsed.description,
                        "Recorded"
                    );
                    result_row(record, parsed)
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(serial = %record.serial_number, error = %err, "Lookup failed");
                    result_row(
                        record,
                        ParsedError {
                            code: "Error".to_string(),
                            description: format!("Processing failed: {err}"),
                        },
                    )
                }
            };
            ledger.append(&row)?;

            if i + 1 < pending.len() {
                tokio::time::sleep(self.config.pacing.between_serials).await;
            }
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch run complete"
        );
        Ok(summary)
    }

    /// The full lookup sequence for one serial. Expected-empty outcomes
    /// (no detail link, no table row at the record's station) return the
    /// `Unknown` sentinel; only unexpected failures are `Err`.
    async fn lookup(&self, record: &SerialRecord) -> Result<ParsedError, ScrapeError> {
        let pacing = &self.config.pacing;

        // NAVIGATE + SUBMIT_SERIAL
        self.driver.navigate(&self.config.summary_url).await?;
        tokio::time::sleep(pacing.after_navigate).await;
        let input = self
            .driver
            .wait_for(SERIAL_INPUT, SERIAL_INPUT_TIMEOUT)
            .await?;
        self.driver.fill(&input, &record.serial_number).await?;
        self.driver.press_enter(&input).await?;
        tokio::time::sleep(pacing.after_submit).await;

        // LOCATE_DETAIL_LINK
        let detail_links = self.driver.find_all(DETAIL_LINKS).await?;
        let Some(first_link) = detail_links.first() else {
            info!(serial = %record.serial_number, "No detail link found");
            return Ok(ParsedError::unknown());
        };
        let Some(href) = self.driver.attribute(first_link, "href").await? else {
            info!(serial = %record.serial_number, "Detail link has no href");
            return Ok(ParsedError::unknown());
        };

        // OPEN_DETAIL
        let detail_url = resolve_href(&self.driver.current_url().await?, &href)?;
        self.driver.navigate(&detail_url).await?;
        tokio::time::sleep(pacing.before_service_record).await;

        // LOCATE_SERVICE_RECORD — absence is tolerated, the table may
        // already be on the detail page.
        if let Err(err) = self.open_service_record().await {
            info!(serial = %record.serial_number, error = %err, "No service record link");
        }
        tokio::time::sleep(pacing.after_service_record).await;

        // SCRAPE_TABLE
        tokio::time::sleep(pacing.before_table_scan).await;
        self.driver.wait_for(RECORD_TABLE, TABLE_TIMEOUT).await?;

        // MATCH_ROW + EXTRACT_REASON
        let rows = self
            .driver
            .find_all(&format!("{RECORD_TABLE} tr"))
            .await?;
        for row in &rows {
            let cells = self.driver.find_within(row, "td").await?;
            if cells.len() < 4 {
                continue;
            }
            let station_raw = self.driver.read_text(&cells[0]).await?;
            let station = normalize_station(&station_raw);
            if station != record.workstation_prefix.to_uppercase() {
                continue;
            }
            let status = self.driver.read_text(&cells[2]).await?;
            let status = status.trim().to_lowercase();
            if status != "fail" {
                continue;
            }

            // First match wins. Expand the reason cell before reading it.
            self.driver.click(&cells[3]).await?;
            tokio::time::sleep(pacing.after_expand).await;
            let reason = self.driver.read_text(&cells[3]).await?;
            let reason = reason.trim();

            if station.is_empty() || status.is_empty() || reason.is_empty() {
                return Ok(ParsedError::unknown());
            }
            info!(
                serial = %record.serial_number,
                station = %station,
                reason = %reason,
                "Matched fail row"
            );
            return Ok(parse_reason(reason));
        }

        info!(serial = %record.serial_number, "No matching fail row");
        Ok(ParsedError::unknown())
    }

    /// Follows the Service Record button when present.
    async fn open_service_record(&self) -> Result<(), ScrapeError> {
        self.driver
            .wait_for(SERVICE_RECORD_BUTTONS, SERVICE_RECORD_TIMEOUT)
            .await?;
        let buttons = self.driver.find_all(SERVICE_RECORD_BUTTONS).await?;
        for button in &buttons {
            let label = self.driver.read_text(button).await?;
            if !label.contains(SERVICE_RECORD_LABEL) {
                continue;
            }
            let Some(href) = self.driver.attribute(button, "href").await? else {
                continue;
            };
            let target = resolve_href(&self.driver.current_url().await?, &href)?;
            self.driver.navigate(&target).await?;
            return Ok(());
        }
        Err(ScrapeError::ElementNotFound(
            "Service Record button".to_string(),
        ))
    }
}

fn result_row(record: &SerialRecord, parsed: ParsedError) -> ResultRow {
    ResultRow {
        serial_number: record.serial_number.clone(),
        part_number: record.part_number.clone(),
        error_code: parsed.code,
        error_description: parsed.description,
        last_station_known: record.workstation_name.clone(),
    }
}
