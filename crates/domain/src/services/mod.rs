//! Domain services of the report scheduler.
//!
//! Services hold the business rules and talk to storage and external
//! collaborators only through the traits declared here and in
//! [`crate::repositories`].

pub mod delivery;
pub mod quota;
pub mod render;
pub mod reports;
pub mod schedule;
pub mod tracker;

pub use delivery::{
    storage_key, Attachment, DashboardSource, DeliveryService, EmailMessage, EmailTransport,
    FtpClient, InMemoryObjectStore, MockEmailTransport, MockFtpClient, ObjectStore,
    StaticDashboardSource, DEFAULT_PRESIGN_TTL,
};
pub use quota::{MockTenantService, QuotaGuard, TenantService};
pub use render::{
    Artifact, MockRenderBackend, PlaceholderReason, RenderBackend, RenderDispatcher, RenderKey,
    RenderKeyStore, RenderOptions, RenderRequest, RenderSettings, RENDER_KEY_HEADER,
};
pub use reports::ReportService;
pub use schedule::{next_run_at, next_run_for, parse_cron, parse_timezone};
pub use tracker::{JobTracker, ReportHistory, TrackerSettings};
