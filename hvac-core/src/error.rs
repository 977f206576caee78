use thiserror::Error;

/// Errors surfaced by the shared core: persistence only.
///
/// Device-not-found is handled as a soft, logged no-op at the call
/// sites that look devices up (e.g. `Coordinator::handle_thermostat_event`),
/// since no operation owned by this crate performs a device lookup that
/// can fail. Cloud-specific failure classes (transient/permanent/
/// unauthenticated) live in `hvac-cloud::CloudError`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("persisted state io failure: {0}")]
    PersistenceIo(#[from] std::io::Error),

    #[error("persisted state decode failure: {0}")]
    PersistenceDecode(#[from] serde_json::Error),
}
