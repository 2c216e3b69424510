//! Image generation providers.

mod dalle;
mod relay;

pub use dalle::{DalleBackend, DalleProvider, DalleProviderBuilder};
pub use relay::{RelayClient, RelayClientBuilder};

use std::time::Duration;

/// Per-call timeout; one DALL-E 3 generation routinely takes 10-30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
