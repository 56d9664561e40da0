//! Operator-triggered replay of pending entries.

use anyhow::{Context, Result};
use courier_store::ProjectStore;
use courier_types::{EventType, OutstandingEntry};

use crate::aggregator;
use crate::attempt::{Attempt, AttemptOutcome};
use crate::coordinator::{confirm, load_descriptor, log_event, reason_for, send};
use crate::endpoint::Endpoint;
use crate::error::NotifyError;
use crate::reporter::{Reporter, diagnostic};

/// Reason reported when the entry was resolved before the resend ran.
pub const ALREADY_RESOLVED: &str = "entry already resolved";

/// Replay pending entry `entry_id` of build `build_number`.
///
/// A failed replay leaves the entry unresolved and stores no new entry. Errors
/// only when the entry cannot be found or read.
pub fn resend(
    project: &ProjectStore,
    build_number: u64,
    entry_id: &str,
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) -> Result<AttemptOutcome> {
    let build = project.build(build_number);
    let entry = build
        .entry(entry_id)?
        .with_context(|| format!("no pending entry {entry_id} on build #{build_number}"))?;

    if entry.resolved {
        reporter.info(&format!(
            "pending entry {entry_id} of build #{build_number} is already resolved; \
             nothing to resend"
        ));
        return Ok(AttemptOutcome::Skipped(ALREADY_RESOLVED.to_string()));
    }

    let record = entry.to_record();
    let mut attempt = Attempt::resumed();

    let module = match load_descriptor(&record, reporter) {
        Ok(module) => module,
        Err(err) => {
            reporter.warn(&format!(
                "{err}; pending entry {entry_id} of build #{build_number} left as is"
            ));
            return Ok(AttemptOutcome::Skipped(err.to_string()));
        }
    };

    attempt.begin();
    reporter.info(&format!(
        "resending {} of {} from build #{build_number} to {}",
        record.action,
        record.module,
        endpoint.registry()
    ));

    match send(&record, module.as_ref(), endpoint) {
        Ok(receipt) => {
            if let Err(err) = aggregator::discard(&build, entry_id, reporter) {
                reporter.error(&diagnostic(&err));
            }
            confirm(project, &build, &receipt, endpoint, reporter);
            Ok(attempt.finish(AttemptOutcome::Delivered(receipt)))
        }
        Err(err) => {
            if !matches!(err, NotifyError::Unreachable { .. }) {
                reporter.error(&format!(
                    "{} of {}: {}",
                    record.action,
                    record.module,
                    diagnostic(&err)
                ));
            }
            let reason = reason_for(&err);
            reporter.warn(&format!(
                "{reason}; pending entry {entry_id} of build #{build_number} stays unresolved"
            ));
            log_event(
                &build,
                &record.module,
                EventType::Postponed {
                    action: record.action,
                    entry_id: entry_id.to_string(),
                    reason: reason.clone(),
                },
                reporter,
            );
            Ok(attempt.finish(AttemptOutcome::Postponed(reason)))
        }
    }
}

/// Replay every outstanding entry of the project, most recent build first.
/// A failing entry does not stop the others.
pub fn resend_all(
    project: &ProjectStore,
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) -> Vec<(OutstandingEntry, AttemptOutcome)> {
    let outstanding = aggregator::collect_outstanding(project, reporter);
    if outstanding.is_empty() {
        reporter.info("no pending entry to resend");
    }

    let mut results = Vec::with_capacity(outstanding.len());
    for item in outstanding {
        match resend(project, item.build, &item.entry.id, endpoint, reporter) {
            Ok(outcome) => results.push((item, outcome)),
            Err(err) => reporter.error(&format!(
                "failed to resend entry {} of build #{}: {err:#}",
                item.entry.id, item.build
            )),
        }
    }
    results
}
