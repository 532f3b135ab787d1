pub mod client;
pub mod retry;

pub use client::ApiClient;
pub use programsync_api_types;
pub use retry::RetryConfig;
