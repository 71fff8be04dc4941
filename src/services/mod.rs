// Services module - Data sources and the push-provisioning flow

pub mod data_source;
pub mod mock;
pub mod remote;
pub mod routing;
pub mod selection;
pub mod sequencer;
pub mod token_registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use data_source::{DataSource, DataSourceError};
pub use routing::{BackendRoute, RoutedDataSource};
pub use selection::SelectionSet;
pub use sequencer::{ProvisioningSequencer, SequencerConfig, SequencerError, SequencerHandle};
pub use token_registry::{RegistryError, TokenRegistry, ToggleOutcome};
