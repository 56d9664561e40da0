use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use courier_registry::{Ack, DeliveryClient, RegistryError};
use courier_types::{Artifact, Credentials, Dependency, Module, ModuleIdentity};

use crate::reporter::Reporter;

#[derive(Default)]
pub(crate) struct CollectingReporter {
    pub infos: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn info(&mut self, msg: &str) {
        self.infos.push(msg.to_string());
    }

    fn warn(&mut self, msg: &str) {
        self.warns.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }
}

/// In-memory registry that answers from a script and records every call.
pub(crate) struct ScriptedClient {
    reachable: Cell<bool>,
    failures: RefCell<VecDeque<u16>>,
    report_fails: Cell<bool>,
    pub calls: RefCell<Vec<String>>,
    pub credentials: RefCell<Vec<Credentials>>,
}

impl ScriptedClient {
    pub fn reachable() -> Self {
        Self {
            reachable: Cell::new(true),
            failures: RefCell::new(VecDeque::new()),
            report_fails: Cell::new(false),
            calls: RefCell::new(Vec::new()),
            credentials: RefCell::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        let client = Self::reachable();
        client.reachable.set(false);
        client
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.set(reachable);
    }

    /// The next post or promote answers with `status`.
    pub fn fail_next(&self, status: u16) -> &Self {
        self.failures.borrow_mut().push_back(status);
        self
    }

    pub fn fail_reports(&self) {
        self.report_fails.set(true);
    }

    /// Post and promote calls, ignoring probes and report fetches.
    pub fn sends(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("post ") || c.starts_with("promote "))
            .cloned()
            .collect()
    }

    fn answer(&self, call: String, credentials: &Credentials) -> Result<Ack, RegistryError> {
        self.calls.borrow_mut().push(call);
        self.credentials.borrow_mut().push(credentials.clone());
        match self.failures.borrow_mut().pop_front() {
            Some(status) => Err(RegistryError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(Ack { status: 201 }),
        }
    }
}

impl DeliveryClient for ScriptedClient {
    fn base_url(&self) -> &str {
        "http://registry.test:8074"
    }

    fn is_reachable(&self) -> bool {
        self.calls.borrow_mut().push("ping".to_string());
        self.reachable.get()
    }

    fn post_module(
        &self,
        module: &Module,
        credentials: &Credentials,
    ) -> Result<Ack, RegistryError> {
        self.answer(format!("post {}", module.identity()), credentials)
    }

    fn promote_module(
        &self,
        module: &ModuleIdentity,
        credentials: &Credentials,
    ) -> Result<Ack, RegistryError> {
        self.answer(format!("promote {module}"), credentials)
    }

    fn dependencies(&self, module: &ModuleIdentity) -> Result<Vec<Dependency>, RegistryError> {
        self.calls.borrow_mut().push(format!("dependencies {module}"));
        if self.report_fails.get() {
            return Err(RegistryError::Status {
                status: 404,
                body: "no report".to_string(),
            });
        }
        Ok(vec![Dependency {
            target: Artifact {
                group_id: "org.acme".to_string(),
                artifact_id: "util".to_string(),
                version: "0.9".to_string(),
                classifier: None,
                extension: None,
            },
            scope: "compile".to_string(),
        }])
    }
}

/// Write a descriptor for `name@version` under `dir` and return its path.
pub(crate) fn write_descriptor(
    dir: &std::path::Path,
    name: &str,
    version: &str,
) -> std::path::PathBuf {
    std::fs::create_dir_all(dir).expect("descriptor dir");
    let path = dir.join(format!("{name}-{version}.json"));
    std::fs::write(
        &path,
        format!(
            r#"{{"name": "{name}", "version": "{version}", "buildInfo": {{"job": "nightly"}}}}"#
        ),
    )
    .expect("write descriptor");
    path
}
