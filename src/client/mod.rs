pub mod auth;
mod builder;
pub mod facade;
pub mod transport;

pub use auth::{SharedToken, TokenProvider};
pub use builder::OfflineClientBuilder;
pub use facade::{Delivery, OfflineClient, OfflineOptions, RequestConfig};
pub use transport::{send_with_timeout, ApiRequest, HttpTransport, Transport};
