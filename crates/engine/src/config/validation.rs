use super::loader::{ConfigError, EngineConfig};

/// Validate the complete engine configuration.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_store(config, &mut errors);
    validate_listing(config, &mut errors);
    validate_reconciliation(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_store(config: &EngineConfig, errors: &mut Vec<String>) {
    let s = &config.system.store;

    if s.max_connections == 0 {
        errors.push("store.max_connections must be > 0".into());
    }
    if s.acquire_timeout_seconds == 0 {
        errors.push("store.acquire_timeout_seconds must be > 0".into());
    }
}

fn validate_listing(config: &EngineConfig, errors: &mut Vec<String>) {
    let l = &config.system.listing;

    if l.max_page_size == 0 {
        errors.push("listing.max_page_size must be > 0".into());
    }
    if l.default_page_size == 0 {
        errors.push("listing.default_page_size must be > 0".into());
    }
    if l.default_page_size > l.max_page_size {
        errors.push("listing.default_page_size must be <= max_page_size".into());
    }
}

fn validate_reconciliation(config: &EngineConfig, errors: &mut Vec<String>) {
    let r = &config.system.reconciliation;

    if !r.enabled {
        return;
    }
    if r.interval_minutes == 0 {
        errors.push("reconciliation.interval_minutes must be > 0".into());
    }
    if r.batch_size == 0 {
        errors.push("reconciliation.batch_size must be > 0".into());
    }
}
