//! Control-plane client for the toolgate provisioner.
//!
//! The same typed operations run over two transports: direct HTTP against a
//! self-hosted gateway console ([`http::HttpTransport`]) or a shell-out to
//! the cloud vendor CLI ([`cli_proxy::CliTransport`]). Error classification
//! (`NotFound`, `Conflict`, transient transport failures) happens once at the
//! transport boundary and the retry policy applies uniformly on top.

pub mod cli_proxy;
pub mod cloud;
pub mod console;
pub mod error;
pub mod http;
pub mod retry;
pub mod transport;

pub use cli_proxy::CliTransport;
pub use cloud::{CloudApi, CloudRouteSpec, CloudServiceSpec};
pub use console::{
    ConsoleApi, ConsoleRouteSpec, ConsumerCredential, ConsumerSpec, PluginInstanceSpec,
    RemoteState, ServiceSourceSpec,
};
pub use error::{ControlPlaneError, Result};
pub use http::HttpTransport;
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, Method, Transport};
