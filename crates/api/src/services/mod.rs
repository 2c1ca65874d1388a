//! HTTP and network clients of the collaborators the domain talks to.

pub mod dashboards;
pub mod email;
pub mod ftp;
pub mod object_store;
pub mod renderer;
pub mod tenant_client;

pub use dashboards::GrafanaDashboards;
pub use email::{EmailError, EmailService};
pub use ftp::{FtpError, TokioFtpClient};
pub use object_store::{ObjectStoreError, S3ObjectStore};
pub use renderer::HttpRenderBackend;
pub use tenant_client::{HttpTenantService, StaticTenantService, UnconfiguredTenantService};
