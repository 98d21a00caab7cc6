pub mod config;
pub mod gateway;
pub mod orchestrator;
pub mod progress;
pub mod store;

pub use gateway::{ApiGateway, HttpReportService, ReportFile, ReportService};
pub use orchestrator::{Completion, Workflow, WorkflowSnapshot};
pub use store::ResultStore;
