//! Daily backup report.

use crate::models::DATE_FORMAT;
use crate::notify::{daily_report_message, Notifier};
use crate::store::HistoryStore;
use chrono::{Duration, Local};
use tracing::{error, info};

/// Send a summary of the backups recorded in the last 24 hours.
pub fn send_daily_report(
    store: &dyn HistoryStore,
    notifier: &dyn Notifier,
    recipient: Option<String>,
) -> bool {
    let since = (Local::now() - Duration::hours(24)).format(DATE_FORMAT).to_string();
    let records = match store.backups_since(&since) {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Could not read backups for the daily report");
            return false;
        }
    };

    let message = daily_report_message(&records).to(recipient);
    match notifier.send(&message) {
        Ok(()) => {
            info!(backups = records.len(), "Daily report sent");
            true
        }
        Err(e) => {
            error!(error = %e, "Daily report not sent");
            false
        }
    }
}
