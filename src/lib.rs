//! Phase scheduling, Gantt layout and view synchronization for project timelines.
//!
//! - [`schedule`] turns phase duration estimates into planned date ranges.
//! - [`layout`] turns phases into percentage-based Gantt bar geometry.
//! - [`store`] and [`io::file`] persist one phase list per project.
//! - [`sync`] is the publish/subscribe bus views use to hear about changes.
//! - [`coordinator`] ties them together behind the Active and Consolidated views.

pub mod config;
pub mod coordinator;
pub mod io;
pub mod layout;
pub mod model;
pub mod schedule;
pub mod source;
pub mod store;
pub mod sync;

pub use config::Config;
pub use coordinator::{
    Applied, CoordinatorConfig, CoordinatorError, LoadRequest, LoadResult, TimelineLoader,
    ViewCoordinator, ViewTarget,
};
pub use layout::{compute_layout, BarGeometry, GanttLayout, PhaseBar};
pub use model::{Phase, PhaseEstimate, PhaseStatus, Project, ViewContext, ViewMode};
pub use schedule::{schedule, Schedule, ScheduleWarning};
pub use source::{EstimationSource, ProjectDirectory, SourceError};
pub use store::{MemoryTimelineStore, StoreError, TimelineStore};
pub use sync::{EventKind, PublishReport, SyncBus, SyncEvent};
