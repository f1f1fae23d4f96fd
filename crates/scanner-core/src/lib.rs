pub mod envelope;
pub mod error;
pub mod provider;
pub mod throttle;
pub mod types;

pub use envelope::{ApiResponse, ApiStatus, RateLimitInfo};
pub use error::ProviderError;
pub use provider::{unsupported, DataProvider, Operation, ProviderType};
pub use throttle::Throttle;
pub use types::*;
