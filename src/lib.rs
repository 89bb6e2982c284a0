//! lodestar library
//!
//! Payload execution engine for the lodestar post-install tool: a catalog
//! of optional components is selected elsewhere, and this crate plans the
//! resulting payloads into deterministic phases, drives the external
//! package-manager tools with live progress extraction, and reports
//! aggregate progress to a polling observer.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod parsers;
pub mod payload;
pub mod planner;
pub mod process_guard;
pub mod process_runner;
pub mod progress;

// Re-export main types for convenience
pub use catalog::{Catalog, default_catalog};
pub use error::{LodestarError, Result};
pub use executor::{Engine, RunSummary, ToolConfig, spawn_run};
pub use parsers::{LineParser, PackageProgressParser, SilentParser};
pub use payload::{App, AppSummary, BinaryOption, OPTION_ENV, Payload, PayloadKind};
pub use planner::{ExecutionPlan, SpecialKind, SpecialPayload, build_plan};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use process_runner::{OUTPUT_PREFIX, ToolOutput, run_with_line_parse};
pub use progress::{Phase, ProgressObserver, ProgressState, ProgressTracker};

// Hardware detection procedures the catalog binds to
pub use hardware::{DriverSeries, driver_series_for, setup_broadcom, setup_nvidia};
