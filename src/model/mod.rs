pub mod phase;
pub mod project;
pub mod timeline;

pub use phase::{Phase, PhaseEstimate, PhaseStatus};
pub use project::{Project, ViewContext, ViewMode};
pub use timeline::TimelineScale;
