//! Delivery of a finished build's notifications.
//!
//! Records are processed strictly in queue order, one at a time. Every failure
//! stays inside the record that caused it: a configuration problem drops the
//! record, anything else leaves a pending-resend entry on the build, and the
//! batch moves on. Nothing here fails the build.

use chrono::Utc;
use courier_config::Config;
use courier_store::{BuildStore, ProjectStore};
use courier_types::{
    BuildOutcome, DeliveryEvent, DeliveryReceipt, DependencyReport, EventType, Module,
    ModuleIdentity, NotificationAction, NotificationRecord, PostponeReason,
};

use crate::aggregator;
use crate::attempt::{Attempt, AttemptOutcome};
use crate::descriptor;
use crate::endpoint::{Endpoint, client_for, resolve_profile};
use crate::error::NotifyError;
use crate::reporter::{Reporter, diagnostic};

/// How far a batch got.
#[derive(Debug)]
pub enum BatchStatus {
    /// Every record was processed
    Processed,
    /// The build did not succeed, so nothing was sent
    BuildNotSuccessful(Option<BuildOutcome>),
    /// The build queued no notification
    NothingToSend,
    /// The batch could not start
    Aborted(NotifyError),
}

/// What a delivery did, record by record.
#[derive(Debug)]
pub struct DeliverySummary {
    pub build: u64,
    pub status: BatchStatus,
    pub outcomes: Vec<(NotificationRecord, AttemptOutcome)>,
}

impl DeliverySummary {
    fn new(build: u64, status: BatchStatus) -> Self {
        Self {
            build,
            status,
            outcomes: Vec::new(),
        }
    }

    /// A batch that could not start because of `err`.
    pub fn aborted(build: u64, err: NotifyError) -> Self {
        Self::new(build, BatchStatus::Aborted(err))
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_delivered()).count()
    }

    pub fn postponed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_postponed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AttemptOutcome::Skipped(_)))
            .count()
    }
}

/// Deliver the queued notifications of build `build_number`, using the
/// registry profile from `config` (or `requested_profile` when given).
pub fn run_delivery(
    config: &Config,
    requested_profile: Option<&str>,
    project: &ProjectStore,
    build_number: u64,
    reporter: &mut dyn Reporter,
) -> DeliverySummary {
    let build = project.build(build_number);

    let loaded = build
        .info()
        .and_then(|info| Ok((info, build.queued_records()?)));
    let (info, records) = match loaded {
        Ok(loaded) => loaded,
        Err(source) => {
            let err =
                NotifyError::storage(format!("failed to load build #{build_number}"), source);
            reporter.error(&diagnostic(&err));
            return DeliverySummary::aborted(build_number, err);
        }
    };

    if let Some(status) = precheck(&build, info.outcome, &records, reporter) {
        return DeliverySummary::new(build_number, status);
    }

    let profile = match resolve_profile(config, requested_profile) {
        Ok(profile) => profile,
        Err(err) => {
            reporter.error(&format!("{err}; no notification sent"));
            return DeliverySummary::aborted(build_number, err);
        }
    };

    reporter.info(&format!(
        "notifying registry '{}' at {}:{}",
        profile.name, profile.host, profile.port
    ));
    let client = client_for(profile);
    let endpoint = Endpoint::new(&client, profile.credentials());

    let mut summary = DeliverySummary::new(build_number, BatchStatus::Processed);
    summary.outcomes = deliver_batch(project, &build, &records, &endpoint, reporter);
    summary
}

/// Deliver `records` on behalf of `build` through an already chosen endpoint.
pub fn deliver(
    project: &ProjectStore,
    build: &BuildStore,
    outcome: Option<BuildOutcome>,
    records: &[NotificationRecord],
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) -> DeliverySummary {
    if let Some(status) = precheck(build, outcome, records, reporter) {
        return DeliverySummary::new(build.number(), status);
    }

    reporter.info(&format!("notifying registry at {}", endpoint.registry()));
    let mut summary = DeliverySummary::new(build.number(), BatchStatus::Processed);
    summary.outcomes = deliver_batch(project, build, records, endpoint, reporter);
    summary
}

fn precheck(
    build: &BuildStore,
    outcome: Option<BuildOutcome>,
    records: &[NotificationRecord],
    reporter: &mut dyn Reporter,
) -> Option<BatchStatus> {
    if !BuildOutcome::allows_delivery(outcome) {
        let shown = outcome.map_or_else(|| "unfinished".to_string(), |o| o.to_string());
        reporter.info(&format!(
            "build #{} is {shown}; registry is not notified",
            build.number()
        ));
        return Some(BatchStatus::BuildNotSuccessful(outcome));
    }

    if records.is_empty() {
        reporter.info(&format!("build #{}: no notification to send", build.number()));
        return Some(BatchStatus::NothingToSend);
    }

    None
}

fn deliver_batch(
    project: &ProjectStore,
    build: &BuildStore,
    records: &[NotificationRecord],
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) -> Vec<(NotificationRecord, AttemptOutcome)> {
    records
        .iter()
        .map(|record| {
            let outcome = deliver_record(project, build, record, endpoint, reporter);
            (record.clone(), outcome)
        })
        .collect()
}

fn deliver_record(
    project: &ProjectStore,
    build: &BuildStore,
    record: &NotificationRecord,
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) -> AttemptOutcome {
    let mut attempt = Attempt::queued();

    let module = match load_descriptor(record, reporter) {
        Ok(module) => module,
        Err(err) => return skip(build, record, &err, reporter),
    };

    let mut pending = record.clone();
    if let Some(module) = &module {
        pending.module = module.identity();
    }
    attempt.begin();

    if record.action == NotificationAction::PostModule
        && let Some(payload) = &record.payload
    {
        match build.materialize_payload(&pending.module, payload) {
            Ok(copy) => pending.payload = Some(copy),
            Err(source) => {
                let err = NotifyError::storage(
                    format!("failed to copy module descriptor {}", payload.display()),
                    source,
                );
                reporter.error(&diagnostic(&err));
                return postpone(build, attempt, &pending, reason_for(&err), reporter);
            }
        }
    }

    match send(&pending, module.as_ref(), endpoint) {
        Ok(receipt) => {
            confirm(project, build, &receipt, endpoint, reporter);
            attempt.finish(AttemptOutcome::Delivered(receipt))
        }
        Err(err) => {
            if !matches!(err, NotifyError::Unreachable { .. }) {
                reporter.error(&format!(
                    "{} of {}: {}",
                    pending.action,
                    pending.module,
                    diagnostic(&err)
                ));
            }
            postpone(build, attempt, &pending, reason_for(&err), reporter)
        }
    }
}

/// Load the descriptor a `PostModule` record points at. `Promote` needs none.
pub(crate) fn load_descriptor(
    record: &NotificationRecord,
    reporter: &mut dyn Reporter,
) -> Result<Option<Module>, NotifyError> {
    if record.action != NotificationAction::PostModule {
        return Ok(None);
    }

    let payload = record.payload.as_deref().ok_or_else(|| {
        NotifyError::Configuration(format!("no module descriptor declared for {}", record.module))
    })?;
    if !payload.is_file() {
        return Err(NotifyError::Configuration(format!(
            "module descriptor for {} not found at {}",
            record.module,
            payload.display()
        )));
    }

    let module = descriptor::parse(payload)
        .map_err(|e| NotifyError::Configuration(format!("{e:#}")))?;
    if module.identity() != record.module {
        reporter.warn(&format!(
            "descriptor {} describes {} but was queued as {}; sending {}",
            payload.display(),
            module.identity(),
            record.module,
            module.identity()
        ));
    }
    Ok(Some(module))
}

/// Probe the registry, then perform the record's action.
pub(crate) fn send(
    record: &NotificationRecord,
    module: Option<&Module>,
    endpoint: &Endpoint<'_>,
) -> Result<DeliveryReceipt, NotifyError> {
    let registry = endpoint.registry().to_string();
    if !endpoint.client.is_reachable() {
        return Err(NotifyError::Unreachable { registry });
    }

    let result = match record.action {
        NotificationAction::PostModule => {
            let module = module.ok_or_else(|| {
                NotifyError::Configuration(format!(
                    "no module descriptor loaded for {}",
                    record.module
                ))
            })?;
            endpoint.client.post_module(module, &endpoint.credentials)
        }
        NotificationAction::Promote => endpoint
            .client
            .promote_module(&record.module, &endpoint.credentials),
    };

    let ack = result.map_err(|source| NotifyError::Delivery {
        registry: registry.clone(),
        source,
    })?;

    Ok(DeliveryReceipt {
        action: record.action,
        module: record.module.clone(),
        registry,
        status: ack.status,
        delivered_at: Utc::now(),
    })
}

/// Bookkeeping after the registry accepted a notification.
pub(crate) fn confirm(
    project: &ProjectStore,
    build: &BuildStore,
    receipt: &DeliveryReceipt,
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) {
    match receipt.action {
        NotificationAction::PostModule => reporter.info(&format!(
            "module {} successfully sent to {}",
            receipt.module, receipt.registry
        )),
        NotificationAction::Promote => reporter.info(&format!(
            "module {} successfully promoted on {}",
            receipt.module, receipt.registry
        )),
    }
    log_event(
        build,
        &receipt.module,
        EventType::Delivered {
            receipt: receipt.clone(),
        },
        reporter,
    );

    if receipt.action == NotificationAction::PostModule {
        aggregator::reconcile(project, &receipt.module, reporter);
        attach_dependency_report(build, &receipt.module, endpoint, reporter);
    }
}

fn attach_dependency_report(
    build: &BuildStore,
    module: &ModuleIdentity,
    endpoint: &Endpoint<'_>,
    reporter: &mut dyn Reporter,
) {
    let dependencies = match endpoint.client.dependencies(module) {
        Ok(dependencies) => dependencies,
        Err(err) => {
            reporter.warn(&format!(
                "failed to fetch dependency report for {module}: {}",
                diagnostic(&err)
            ));
            return;
        }
    };

    let report = DependencyReport {
        module: module.clone(),
        generated_at: Utc::now(),
        dependencies,
    };
    match build.attach_dependency_report(&report) {
        Ok(()) => reporter.info(&format!(
            "dependency report for {module} attached to build #{}",
            build.number()
        )),
        Err(err) => reporter.warn(&format!(
            "failed to attach dependency report for {module}: {err:#}"
        )),
    }
}

fn skip(
    build: &BuildStore,
    record: &NotificationRecord,
    err: &NotifyError,
    reporter: &mut dyn Reporter,
) -> AttemptOutcome {
    reporter.warn(&format!(
        "{err}; {} of {} skipped and not queued for resend",
        record.action, record.module
    ));
    log_event(
        build,
        &record.module,
        EventType::Skipped {
            action: record.action,
            reason: err.to_string(),
        },
        reporter,
    );
    AttemptOutcome::Skipped(err.to_string())
}

fn postpone(
    build: &BuildStore,
    mut attempt: Attempt,
    record: &NotificationRecord,
    reason: PostponeReason,
    reporter: &mut dyn Reporter,
) -> AttemptOutcome {
    match build.append(record) {
        Ok(entry) => {
            reporter.warn(&format!(
                "{reason}; {} of {} postponed as pending entry {} of build #{}",
                record.action,
                record.module,
                entry.id,
                build.number()
            ));
            log_event(
                build,
                &record.module,
                EventType::Postponed {
                    action: record.action,
                    entry_id: entry.id,
                    reason: reason.clone(),
                },
                reporter,
            );
        }
        Err(source) => {
            let err = NotifyError::storage(
                format!("failed to store pending entry for {}", record.module),
                source,
            );
            reporter.error(&diagnostic(&err));
        }
    }

    attempt.finish(AttemptOutcome::Postponed(reason))
}

pub(crate) fn reason_for(err: &NotifyError) -> PostponeReason {
    match err {
        NotifyError::Unreachable { .. } => PostponeReason::Unreachable,
        other => PostponeReason::Failed {
            message: diagnostic(other),
        },
    }
}

pub(crate) fn log_event(
    build: &BuildStore,
    module: &ModuleIdentity,
    event_type: EventType,
    reporter: &mut dyn Reporter,
) {
    if let Err(err) = build.record_event(DeliveryEvent::now(module, event_type)) {
        reporter.warn(&format!(
            "failed to write event log of build #{}: {err:#}",
            build.number()
        ));
    }
}
