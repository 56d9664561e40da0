//! Registry endpoint selection.

use courier_config::{Config, RegistryProfile};
use courier_registry::{DeliveryClient, RegistryClient};
use courier_types::Credentials;

use crate::error::NotifyError;

/// A registry client together with the credentials to present to it.
pub struct Endpoint<'a> {
    pub client: &'a dyn DeliveryClient,
    pub credentials: Credentials,
}

impl<'a> Endpoint<'a> {
    pub fn new(client: &'a dyn DeliveryClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn registry(&self) -> &str {
        self.client.base_url()
    }
}

/// Pick the registry profile for a batch.
pub fn resolve_profile<'c>(
    config: &'c Config,
    requested: Option<&str>,
) -> Result<&'c RegistryProfile, NotifyError> {
    if let Some(profile) = config.selected_profile(requested) {
        return Ok(profile);
    }

    let message = match requested.or(config.notifier.profile.as_deref()) {
        Some(name) => format!("unknown registry profile '{name}'"),
        None if config.registries.is_empty() => "no registry profile configured".to_string(),
        None => "several registry profiles configured; select one with [notifier] profile"
            .to_string(),
    };
    Err(NotifyError::Configuration(message))
}

/// A fresh client for one batch. No connection state outlives it.
pub fn client_for(profile: &RegistryProfile) -> RegistryClient {
    RegistryClient::new(&profile.base_url()).with_timeout(profile.timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(names: &[&str], selected: Option<&str>) -> Config {
        let mut config = Config::new();
        config.notifier.profile = selected.map(str::to_string);
        config.registries = names
            .iter()
            .map(|n| RegistryProfile::new(*n, "localhost", 8074))
            .collect();
        config
    }

    #[test]
    fn flag_overrides_configured_profile() {
        let config = config(&["main", "backup"], Some("main"));
        let profile = resolve_profile(&config, Some("backup")).expect("profile");
        assert_eq!(profile.name, "backup");
    }

    #[test]
    fn unknown_profile_is_a_configuration_error() {
        let config = config(&["main"], None);
        let err = resolve_profile(&config, Some("staging")).expect_err("unknown");
        assert!(matches!(err, NotifyError::Configuration(ref m) if m.contains("staging")));
    }

    #[test]
    fn ambiguous_selection_is_a_configuration_error() {
        let config = config(&["main", "backup"], None);
        let err = resolve_profile(&config, None).expect_err("ambiguous");
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_config_is_a_configuration_error() {
        let err = resolve_profile(&Config::new(), None).expect_err("empty");
        assert_eq!(
            err.to_string(),
            "configuration error: no registry profile configured"
        );
    }

    #[test]
    fn client_uses_profile_address_and_timeout() {
        let mut profile = RegistryProfile::new("main", "registry.local", 8074);
        profile.timeout_secs = 5;

        let client = client_for(&profile);
        assert_eq!(client.base_url(), "http://registry.local:8074");
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }
}
