//! Cross-build view of pending resends.
//!
//! Both scans tolerate a build whose history cannot be read: the failure is
//! reported and the build is skipped. An entry appended by a concurrent
//! delivery may be missed by a scan and is simply picked up by the next one.

use courier_store::{BuildStore, EntryFilter, ProjectStore};
use courier_types::{DeliveryEvent, EventType, ModuleIdentity, OutstandingEntry, PendingResendEntry};

use crate::error::NotifyError;
use crate::reporter::{Reporter, diagnostic};

/// Every unresolved entry of the project, most recent build first.
pub fn collect_outstanding(
    project: &ProjectStore,
    reporter: &mut dyn Reporter,
) -> Vec<OutstandingEntry> {
    let mut outstanding = Vec::new();
    for build in builds(project, reporter) {
        if let Some(entries) = unresolved(&build, reporter) {
            outstanding.extend(entries.into_iter().map(|entry| OutstandingEntry {
                build: build.number(),
                entry,
            }));
        }
    }
    outstanding
}

/// Discard every unresolved entry of `module` across the project, whatever
/// action it was waiting for. Returns how many entries were discarded.
pub fn reconcile(
    project: &ProjectStore,
    module: &ModuleIdentity,
    reporter: &mut dyn Reporter,
) -> usize {
    let mut discarded = 0;
    for build in builds(project, reporter) {
        let Some(entries) = unresolved(&build, reporter) else {
            continue;
        };

        for entry in entries.iter().filter(|e| &e.module == module) {
            match discard(&build, &entry.id, reporter) {
                Ok(true) => {
                    reporter.info(&format!(
                        "discarded pending {} of {} on build #{}",
                        entry.action,
                        module,
                        build.number()
                    ));
                    discarded += 1;
                }
                Ok(false) => {}
                Err(err) => reporter.error(&diagnostic(&err)),
            }
        }
    }
    discarded
}

/// Mark one entry resolved and log it to the build's events.
pub(crate) fn discard(
    build: &BuildStore,
    entry_id: &str,
    reporter: &mut dyn Reporter,
) -> Result<bool, NotifyError> {
    let entry = build
        .entry(entry_id)
        .map_err(|e| NotifyError::storage(format!("failed to load pending entry {entry_id}"), e))?;
    let changed = build.discard(entry_id).map_err(|e| {
        NotifyError::storage(
            format!("failed to discard pending entry {entry_id} of build #{}", build.number()),
            e,
        )
    })?;

    if changed && let Some(entry) = entry {
        let event = DeliveryEvent::now(
            &entry.module,
            EventType::Discarded {
                entry_id: entry_id.to_string(),
            },
        );
        if let Err(err) = build.record_event(event) {
            reporter.warn(&format!(
                "failed to log discard of entry {entry_id} on build #{}: {err:#}",
                build.number()
            ));
        }
    }
    Ok(changed)
}

fn builds(project: &ProjectStore, reporter: &mut dyn Reporter) -> Vec<BuildStore> {
    match project.build_numbers() {
        Ok(numbers) => numbers.into_iter().map(|n| project.build(n)).collect(),
        Err(err) => {
            reporter.error(&format!(
                "failed to list builds of {}: {err:#}",
                project.root().display()
            ));
            Vec::new()
        }
    }
}

fn unresolved(build: &BuildStore, reporter: &mut dyn Reporter) -> Option<Vec<PendingResendEntry>> {
    match build.entries(EntryFilter::Unresolved) {
        Ok(entries) => Some(entries),
        Err(source) => {
            let err = NotifyError::Aggregation {
                build: build.number(),
                source,
            };
            reporter.error(&format!("{}; skipping build", diagnostic(&err)));
            None
        }
    }
}
