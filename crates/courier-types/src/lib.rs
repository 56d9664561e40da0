//! Core domain types for courier.
//!
//! This crate provides the types shared across the courier workspace: module
//! identities and descriptors, the notification records queued by a build, the
//! pending-resend entries left behind by undelivered notifications, and the
//! events written to a build's audit log.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a module in the registry.
///
/// Equality is structural over `(name, version)`; this is the key used for
/// deduplication and reconciliation everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentity {
    /// Module name
    pub name: String,
    /// Module version
    pub version: String,
}

impl ModuleIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// An artifact produced by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// A dependency edge from a module to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub target: Artifact,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "compile".to_string()
}

/// A module descriptor as produced by a build.
///
/// The schema is owned by the registry; fields courier does not interpret are
/// kept in `extra` so they survive a parse/post round trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub promoted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submodules: Vec<Module>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_info: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Module {
    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(&self.name, &self.version)
    }
}

/// The registry action a notification asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Push a full module descriptor
    PostModule,
    /// Mark a module version as promoted
    Promote,
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationAction::PostModule => write!(f, "post_module"),
            NotificationAction::Promote => write!(f, "promote"),
        }
    }
}

/// One desired registry action queued by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub action: NotificationAction,
    pub module: ModuleIdentity,
    /// Location of the module descriptor. Present only for `PostModule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PathBuf>,
}

impl NotificationRecord {
    pub fn post_module(module: ModuleIdentity, payload: impl Into<PathBuf>) -> Self {
        Self {
            action: NotificationAction::PostModule,
            module,
            payload: Some(payload.into()),
        }
    }

    pub fn promote(module: ModuleIdentity) -> Self {
        Self {
            action: NotificationAction::Promote,
            module,
            payload: None,
        }
    }
}

/// A durable record of a notification that did not reach the registry.
///
/// Entries are never removed; resolving one only flips `resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResendEntry {
    /// Identifier unique within the owning build
    pub id: String,
    pub action: NotificationAction,
    pub module: ModuleIdentity,
    /// Durable copy of the descriptor. `None` only for `Promote`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PendingResendEntry {
    pub fn new(id: impl Into<String>, record: &NotificationRecord) -> Self {
        Self {
            id: id.into(),
            action: record.action,
            module: record.module.clone(),
            payload: record.payload.clone(),
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    /// Rebuild the notification this entry stands for.
    pub fn to_record(&self) -> NotificationRecord {
        NotificationRecord {
            action: self.action,
            module: self.module.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Mark the entry resolved. Returns `false` if it already was.
    pub fn discard(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
        true
    }

    /// Whether this entry is still waiting for a delivery.
    pub fn to_send(&self) -> bool {
        !self.resolved
    }
}

/// An unresolved entry together with the build that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingEntry {
    pub build: u64,
    pub entry: PendingResendEntry,
}

/// Outcome of a build, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildOutcome {
    pub fn is_worse_than(self, other: BuildOutcome) -> bool {
        self > other
    }

    /// Only finished builds that are at least successful produce registry traffic.
    pub fn allows_delivery(outcome: Option<BuildOutcome>) -> bool {
        matches!(outcome, Some(o) if !o.is_worse_than(BuildOutcome::Success))
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Success => write!(f, "success"),
            BuildOutcome::Unstable => write!(f, "unstable"),
            BuildOutcome::Failure => write!(f, "failure"),
            BuildOutcome::NotBuilt => write!(f, "not_built"),
            BuildOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Build metadata written by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub number: u64,
    /// `None` while the build is still running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BuildOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Credentials passed through to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.as_deref().is_none_or(str::is_empty)
    }
}

/// Proof that the registry accepted a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub action: NotificationAction,
    pub module: ModuleIdentity,
    /// Base URL of the registry that accepted the call
    pub registry: String,
    /// HTTP status returned by the registry
    pub status: u16,
    pub delivered_at: DateTime<Utc>,
}

/// Dependency report fetched after a module was posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub module: ModuleIdentity,
    pub generated_at: DateTime<Utc>,
    pub dependencies: Vec<Dependency>,
}

/// Why a notification was postponed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostponeReason {
    /// The liveness probe failed; no call was attempted
    Unreachable,
    /// The call was attempted and failed
    Failed { message: String },
}

impl fmt::Display for PostponeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostponeReason::Unreachable => write!(f, "registry unreachable"),
            PostponeReason::Failed { message } => write!(f, "delivery failed: {message}"),
        }
    }
}

/// Event types for a build's delivery log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    /// The registry accepted the notification
    Delivered { receipt: DeliveryReceipt },
    /// The notification was stored for a later resend
    Postponed {
        action: NotificationAction,
        entry_id: String,
        reason: PostponeReason,
    },
    /// The notification was dropped as a configuration problem
    Skipped {
        action: NotificationAction,
        reason: String,
    },
    /// A pending entry of this build was resolved
    Discarded { entry_id: String },
}

/// A delivery event for the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The type of event
    #[serde(flatten)]
    pub event_type: EventType,
    /// Module this event relates to, as `name@version`
    pub module: String,
}

impl DeliveryEvent {
    pub fn now(module: &ModuleIdentity, event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            module: module.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn core_identity() -> ModuleIdentity {
        ModuleIdentity::new("core", "1.2.3")
    }

    #[test]
    fn identity_display() {
        assert_eq!(core_identity().to_string(), "core@1.2.3");
    }

    #[test]
    fn identity_equality_is_structural() {
        assert_eq!(core_identity(), ModuleIdentity::new("core", "1.2.3"));
        assert_ne!(core_identity(), ModuleIdentity::new("core", "1.2.4"));
        assert_ne!(core_identity(), ModuleIdentity::new("core-api", "1.2.3"));
    }

    #[test]
    fn outcome_scale_orders_best_to_worst() {
        assert!(BuildOutcome::Unstable.is_worse_than(BuildOutcome::Success));
        assert!(BuildOutcome::Aborted.is_worse_than(BuildOutcome::Failure));
        assert!(!BuildOutcome::Success.is_worse_than(BuildOutcome::Success));
    }

    #[test]
    fn only_successful_builds_allow_delivery() {
        assert!(BuildOutcome::allows_delivery(Some(BuildOutcome::Success)));
        assert!(!BuildOutcome::allows_delivery(Some(BuildOutcome::Unstable)));
        assert!(!BuildOutcome::allows_delivery(Some(BuildOutcome::Failure)));
        assert!(!BuildOutcome::allows_delivery(None));
    }

    #[test]
    fn promote_record_has_no_payload() {
        let record = NotificationRecord::promote(core_identity());
        assert_eq!(record.action, NotificationAction::Promote);
        assert!(record.payload.is_none());
    }

    #[test]
    fn entry_rebuilds_its_record() {
        let record =
            NotificationRecord::post_module(core_identity(), "/builds/7/reports/core.json");
        let entry = PendingResendEntry::new("0001", &record);
        assert_eq!(entry.to_record(), record);
        assert!(entry.to_send());
    }

    #[test]
    fn discard_is_idempotent() {
        let mut entry =
            PendingResendEntry::new("0001", &NotificationRecord::promote(core_identity()));
        assert!(entry.discard());
        let first = entry.resolved_at;

        assert!(!entry.discard());
        assert!(entry.resolved);
        assert_eq!(entry.resolved_at, first);
    }

    #[test]
    fn anonymous_credentials() {
        assert!(Credentials::anonymous().is_anonymous());
        assert!(
            Credentials {
                username: Some(String::new()),
                password: None
            }
            .is_anonymous()
        );
        assert!(!Credentials::basic("ci", "secret").is_anonymous());
    }

    #[test]
    fn module_keeps_unknown_fields() {
        let json = r#"{
            "name": "core",
            "version": "1.2.3",
            "artifacts": [
                {
                    "groupId": "org.example",
                    "artifactId": "core",
                    "version": "1.2.3",
                    "extension": "jar"
                }
            ],
            "dependencies": [
                {"target": {"groupId": "org.example", "artifactId": "util", "version": "2.0"}}
            ],
            "buildInfo": {"jenkins-job": "core-nightly"},
            "organization": "example"
        }"#;

        let module: Module = serde_json::from_str(json).expect("parse");
        assert_eq!(module.identity(), core_identity());
        assert_eq!(module.dependencies[0].scope, "compile");
        assert_eq!(module.build_info["jenkins-job"], "core-nightly");
        assert_eq!(module.extra["organization"], "example");

        let back = serde_json::to_string(&module).expect("serialize");
        assert!(back.contains("\"organization\":\"example\""));
        assert!(back.contains("\"buildInfo\""));
    }

    #[test]
    fn pending_entry_serialized_form() {
        let mut entry =
            PendingResendEntry::new("0001", &NotificationRecord::promote(core_identity()));
        entry.created_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

        let json = serde_json::to_string_pretty(&entry).expect("serialize");
        insta::assert_snapshot!(json, @r#"
        {
          "id": "0001",
          "action": "promote",
          "module": {
            "name": "core",
            "version": "1.2.3"
          },
          "created_at": "2026-01-02T03:04:05Z",
          "resolved": false
        }
        "#);
    }

    #[test]
    fn event_type_serialization() {
        let event = DeliveryEvent::now(
            &core_identity(),
            EventType::Postponed {
                action: NotificationAction::PostModule,
                entry_id: "0001".to_string(),
                reason: PostponeReason::Unreachable,
            },
        );

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"postponed\""));
        assert!(json.contains("\"kind\":\"unreachable\""));
        assert!(json.contains("\"module\":\"core@1.2.3\""));

        let parsed: DeliveryEvent = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, event);
    }

    #[test]
    fn postpone_reason_display() {
        assert_eq!(PostponeReason::Unreachable.to_string(), "registry unreachable");
        assert_eq!(
            PostponeReason::Failed {
                message: "HTTP 500".to_string()
            }
            .to_string(),
            "delivery failed: HTTP 500"
        );
    }

    fn outcome_strategy() -> impl proptest::strategy::Strategy<Value = BuildOutcome> {
        use proptest::prelude::*;
        prop_oneof![
            Just(BuildOutcome::Success),
            Just(BuildOutcome::Unstable),
            Just(BuildOutcome::Failure),
            Just(BuildOutcome::NotBuilt),
            Just(BuildOutcome::Aborted),
        ]
    }

    proptest::proptest! {
        /// Property: delivery is allowed exactly for outcomes no worse than success
        #[test]
        fn delivery_only_for_outcomes_not_worse_than_success(outcome in outcome_strategy()) {
            proptest::prop_assert_eq!(
                BuildOutcome::allows_delivery(Some(outcome)),
                !outcome.is_worse_than(BuildOutcome::Success)
            );
        }

        /// Property: "worse than" is a strict order
        #[test]
        fn worse_than_is_strict(a in outcome_strategy(), b in outcome_strategy()) {
            proptest::prop_assert!(!(a.is_worse_than(b) && b.is_worse_than(a)));
            proptest::prop_assert_eq!(a == b, !a.is_worse_than(b) && !b.is_worse_than(a));
        }

        /// Property: identities with the same parts are equal and print the same
        #[test]
        fn identity_equality_matches_display(
            name in "[a-z][a-z0-9-]{0,12}",
            version in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
        ) {
            let a = ModuleIdentity::new(&name, &version);
            let b = ModuleIdentity::new(name.clone(), version.clone());
            proptest::prop_assert_eq!(a.to_string(), format!("{name}@{version}"));
            proptest::prop_assert_eq!(a, b);
        }
    }
}
