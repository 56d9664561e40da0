//! Build history and pending-resend storage for courier.
//!
//! A project keeps one directory per build under `builds/<number>/`. Each build
//! owns its queued notification records, the pending-resend entries left by
//! deliveries that did not complete, durable copies of module descriptors, and
//! an event log.
//!
//! Pending-resend entries live one per file under `resend/`, so appending an
//! entry or discarding another one is atomic at the granularity of a single
//! entry and needs no lock.
//!
//! # Example
//!
//! ```
//! use courier_store::{EntryFilter, ProjectStore};
//! use courier_types::{ModuleIdentity, NotificationRecord};
//!
//! let dir = tempfile::tempdir().expect("tempdir");
//! let project = ProjectStore::new(dir.path().to_path_buf());
//! let build = project.build(7);
//!
//! let record = NotificationRecord::promote(ModuleIdentity::new("core", "1.2.3"));
//! let entry = build.append(&record).expect("append");
//!
//! assert!(build.discard(&entry.id).expect("discard"));
//! assert!(build.entries(EntryFilter::Unresolved).expect("list").is_empty());
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use courier_events::EventLog;
use courier_types::{
    BuildInfo, DeliveryEvent, DependencyReport, ModuleIdentity, NotificationRecord,
    PendingResendEntry,
};
use serde::{Deserialize, Serialize};

/// Directory holding one sub-directory per build
pub const BUILDS_DIR: &str = "builds";

/// Build metadata written by the host
pub const BUILD_FILE: &str = "build.json";

/// Notification records queued by the build
pub const NOTIFICATIONS_FILE: &str = "notifications.json";

/// Directory of pending-resend entries, one JSON file each
pub const RESEND_DIR: &str = "resend";

/// Directory of durable descriptor copies
pub const REPORTS_DIR: &str = "reports";

/// Dependency report attached after a successful post
pub const DEPENDENCY_REPORT_FILE: &str = "dependency-report.json";

/// Filesystem-backed store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get path to a file in the store
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Ensure the directory exists
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)
                .with_context(|| format!("failed to create dir: {}", self.dir.display()))?;
        }
        Ok(())
    }

    /// Write data to a file atomically
    pub fn write_file(&self, name: &str, content: &[u8]) -> Result<()> {
        self.ensure_dir()?;

        let path = self.file_path(name);
        let tmp_path = path.with_extension("tmp");

        std::fs::write(&tmp_path, content)
            .with_context(|| format!("failed to write file: {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to rename file to: {}", path.display()))?;

        Ok(())
    }

    /// Read data from a file
    pub fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read(&path)
            .with_context(|| format!("failed to read file: {}", path.display()))?;

        Ok(Some(content))
    }

    /// List the files (not directories) in the store
    pub fn list_files(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read dir: {}", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Save JSON data to a file
    pub fn save_json<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data).context("failed to serialize JSON")?;
        self.write_file(name, content.as_bytes())
    }

    /// Load JSON data from a file
    pub fn load_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>> {
        match self.read_file(name)? {
            Some(data) => {
                let parsed: T = serde_json::from_slice(&data).with_context(|| {
                    format!("failed to parse JSON from: {}", self.file_path(name).display())
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

/// The build history of one project.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.root.join(BUILDS_DIR)
    }

    /// Build numbers, most recent first. Entries that are not build
    /// directories are ignored.
    pub fn build_numbers(&self) -> Result<Vec<u64>> {
        let dir = self.builds_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut numbers = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read builds dir: {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(number) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok())
            {
                numbers.push(number);
            }
        }

        numbers.sort_unstable_by(|a, b| b.cmp(a));
        Ok(numbers)
    }

    /// Handle on one build. The directory is created lazily on first write.
    pub fn build(&self, number: u64) -> BuildStore {
        BuildStore::new(number, self.builds_dir().join(number.to_string()))
    }

    /// Record a finished build, as the host does.
    pub fn create_build(&self, info: &BuildInfo) -> Result<BuildStore> {
        let build = self.build(info.number);
        build.write_info(info)?;
        Ok(build)
    }
}

/// Which entries to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFilter {
    /// Only entries still waiting for a delivery
    #[default]
    Unresolved,
    /// Every entry, resolved ones included
    All,
}

/// State owned by one build.
#[derive(Debug, Clone)]
pub struct BuildStore {
    number: u64,
    files: FileStore,
    resend: FileStore,
}

impl BuildStore {
    fn new(number: u64, dir: PathBuf) -> Self {
        Self {
            number,
            resend: FileStore::new(dir.join(RESEND_DIR)),
            files: FileStore::new(dir),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    pub fn info(&self) -> Result<BuildInfo> {
        self.files
            .load_json(BUILD_FILE)?
            .with_context(|| format!("no {BUILD_FILE} for build #{}", self.number))
    }

    pub fn write_info(&self, info: &BuildInfo) -> Result<()> {
        self.files.save_json(BUILD_FILE, info)
    }

    /// Notification records queued for delivery, in queue order.
    pub fn queued_records(&self) -> Result<Vec<NotificationRecord>> {
        Ok(self.files.load_json(NOTIFICATIONS_FILE)?.unwrap_or_default())
    }

    /// Queue a notification record for this build's delivery.
    pub fn queue(&self, record: NotificationRecord) -> Result<()> {
        let mut records = self.queued_records()?;
        records.push(record);
        self.files.save_json(NOTIFICATIONS_FILE, &records)
    }

    /// Store a new pending-resend entry for `record`.
    pub fn append(&self, record: &NotificationRecord) -> Result<PendingResendEntry> {
        let next = self
            .entry_files()?
            .iter()
            .filter_map(|name| name.trim_end_matches(".json").parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        let entry = PendingResendEntry::new(format!("{next:04}"), record);
        self.save_entry(&entry)?;
        Ok(entry)
    }

    /// Pending-resend entries ordered by id.
    pub fn entries(&self, filter: EntryFilter) -> Result<Vec<PendingResendEntry>> {
        let mut entries = Vec::new();
        for name in self.entry_files()? {
            let entry: PendingResendEntry = self
                .resend
                .load_json(&name)?
                .with_context(|| format!("pending entry {name} disappeared"))?;
            if filter == EntryFilter::All || entry.to_send() {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn entry(&self, id: &str) -> Result<Option<PendingResendEntry>> {
        self.resend.load_json(&entry_file(id))
    }

    /// Mark an entry resolved. Returns `false` when it already was.
    pub fn discard(&self, id: &str) -> Result<bool> {
        let mut entry = self
            .entry(id)?
            .with_context(|| format!("no pending entry {id} in build #{}", self.number))?;

        if !entry.discard() {
            return Ok(false);
        }
        self.save_entry(&entry)?;
        Ok(true)
    }

    fn save_entry(&self, entry: &PendingResendEntry) -> Result<()> {
        self.resend.save_json(&entry_file(&entry.id), entry)
    }

    fn entry_files(&self) -> Result<Vec<String>> {
        Ok(self
            .resend
            .list_files()?
            .into_iter()
            .filter(|name| name.ends_with(".json"))
            .collect())
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.files.file_path(REPORTS_DIR)
    }

    /// Copy the descriptor of `module` into this build's reports folder so it
    /// outlives its original location. Each identity gets its own folder, so two
    /// descriptors sharing a file name do not overwrite each other. Returns the
    /// durable path.
    pub fn materialize_payload(&self, module: &ModuleIdentity, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("payload path has no file name: {}", source.display()))?;
        let content = std::fs::read(source)
            .with_context(|| format!("failed to read payload: {}", source.display()))?;

        let reports = FileStore::new(self.reports_dir().join(payload_folder(module)));
        reports.write_file(name, &content)?;
        Ok(reports.file_path(name))
    }

    pub fn attach_dependency_report(&self, report: &DependencyReport) -> Result<()> {
        self.files.save_json(DEPENDENCY_REPORT_FILE, report)
    }

    pub fn dependency_report(&self) -> Result<Option<DependencyReport>> {
        self.files.load_json(DEPENDENCY_REPORT_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        courier_events::events_path(self.dir())
    }

    pub fn record_event(&self, event: DeliveryEvent) -> Result<()> {
        courier_events::append_event(&self.events_path(), event)
    }

    pub fn events(&self) -> Result<EventLog> {
        EventLog::read_from_file(&self.events_path())
    }
}

fn entry_file(id: &str) -> String {
    format!("{id}.json")
}

/// `name@version`, with anything that could escape the folder replaced.
fn payload_folder(module: &ModuleIdentity) -> String {
    format!("{}@{}", module.name, module.version)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
