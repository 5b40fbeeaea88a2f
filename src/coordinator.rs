//! View coordination: which phases are loaded, which are visible, and how
//! edits reach the store and the other views.
//!
//! Loading is split in three steps so the store I/O can run anywhere:
//! [`ViewCoordinator::request`] tags a [`LoadRequest`] with a fresh
//! generation, [`TimelineLoader::fetch`] does the reads (and seeding), and
//! [`ViewCoordinator::apply`] installs the result only if no newer request
//! has been issued since. [`ViewCoordinator::switch_to`] runs all three.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::layout::{compute_layout, GanttLayout};
use crate::model::timeline::today;
use crate::model::{Phase, ViewContext, ViewMode};
use crate::schedule::{schedule, ScheduleWarning};
use crate::source::{EstimationSource, ProjectDirectory, SourceError};
use crate::store::{StoreError, TimelineStore};
use crate::sync::{PublishReport, SyncBus, SyncEvent};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("No projects are known")]
    NoProjects,

    #[error("No view has been loaded yet")]
    NotOpen,

    #[error("Phase {0} is not visible in the current view")]
    PhaseNotFound(Uuid),

    #[error("Phase '{name}' is completed and cannot be edited")]
    PhaseCompleted { phase_id: Uuid, name: String },

    #[error("Actual end {end} is before actual start {start}")]
    InvalidActualRange { start: NaiveDate, end: NaiveDate },

    #[error("Failed to load timeline for '{project_id}': {source}")]
    Load {
        project_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to save timeline for '{project_id}', changes kept in memory: {source}")]
    Save {
        project_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CoordinatorError {
    /// The in-memory state is intact and the operation can be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoordinatorError::Save { .. })
    }
}

/// Tunables for a coordinator.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Start date for freshly seeded schedules. Today when unset.
    pub project_start: Option<NaiveDate>,
    /// Results applied later than this after their request are dropped.
    pub load_timeout: Option<Duration>,
    /// Sync listeners slower than this are reported.
    pub slow_listener_threshold: Option<Duration>,
}

/// What a view is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewTarget {
    Active(String),
    Consolidated,
}

impl ViewTarget {
    pub fn mode(&self) -> ViewMode {
        match self {
            ViewTarget::Active(_) => ViewMode::Active,
            ViewTarget::Consolidated => ViewMode::Consolidated,
        }
    }

    pub fn from_context(context: &ViewContext) -> Self {
        match context.view_mode {
            ViewMode::Active => ViewTarget::Active(context.selected_project_id.clone()),
            ViewMode::Consolidated => ViewTarget::Consolidated,
        }
    }
}

/// A load tagged with the generation that was current when it was issued.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    generation: u64,
    target: ViewTarget,
    issued_at: Instant,
}

impl LoadRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> &ViewTarget {
        &self.target
    }
}

/// Phases fetched for a [`LoadRequest`], waiting to be applied.
#[derive(Debug, Clone)]
pub struct LoadResult {
    request: LoadRequest,
    /// Project ids covered by this load, in display order.
    pub projects: Vec<String>,
    pub phases: Vec<Phase>,
    pub warnings: Vec<ScheduleWarning>,
    /// Seeded projects whose first save failed.
    pub unsaved: Vec<String>,
}

impl LoadResult {
    pub fn generation(&self) -> u64 {
        self.request.generation
    }

    pub fn target(&self) -> &ViewTarget {
        &self.request.target
    }
}

/// What [`ViewCoordinator::apply`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    /// A newer request was issued; the result was dropped.
    Stale { generation: u64, current: u64 },
    /// The result arrived after the load timeout; it was dropped.
    TimedOut { elapsed: Duration },
}

/// One project's phases as fetched from the store or seeded.
#[derive(Debug, Clone)]
pub struct ProjectTimeline {
    pub phases: Vec<Phase>,
    pub warnings: Vec<ScheduleWarning>,
    pub seeded: bool,
    /// Seeded but the save failed.
    pub unsaved: bool,
}

/// Does the store reads for a coordinator. Cheap to clone and `Send`, so a
/// fetch can run on another thread.
#[derive(Clone)]
pub struct TimelineLoader {
    store: Arc<dyn TimelineStore>,
    estimates: Arc<dyn EstimationSource>,
    directory: Arc<dyn ProjectDirectory>,
    project_start: Option<NaiveDate>,
}

impl TimelineLoader {
    /// The stored timeline of `project_id`, or a freshly scheduled one.
    ///
    /// A seeded timeline is written back immediately. A project with neither
    /// a stored timeline nor an estimate loads as empty and is not written.
    pub fn load_or_seed(&self, project_id: &str) -> Result<ProjectTimeline, CoordinatorError> {
        let stored = self
            .store
            .load(project_id)
            .map_err(|source| CoordinatorError::Load {
                project_id: project_id.to_string(),
                source,
            })?;
        if let Some(phases) = stored {
            return Ok(ProjectTimeline {
                phases,
                warnings: Vec::new(),
                seeded: false,
                unsaved: false,
            });
        }

        let estimates = match self.estimates.estimate(project_id) {
            Ok(estimates) => estimates,
            Err(SourceError::NoEstimate(_)) => {
                tracing::warn!(project = %project_id, "no stored timeline and no estimate");
                return Ok(ProjectTimeline {
                    phases: Vec::new(),
                    warnings: Vec::new(),
                    seeded: false,
                    unsaved: false,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let start = self.project_start.unwrap_or_else(today);
        let derived = schedule(project_id, &estimates, start);
        tracing::info!(
            project = %project_id,
            phases = derived.phases.len(),
            %start,
            "seeded timeline from estimate"
        );

        let unsaved = match self.store.save(project_id, &derived.phases) {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(project = %project_id, error = %e, "failed to save seeded timeline");
                true
            }
        };

        Ok(ProjectTimeline {
            phases: derived.phases,
            warnings: derived.warnings,
            seeded: true,
            unsaved,
        })
    }

    /// Read everything `request` needs.
    pub fn fetch(&self, request: &LoadRequest) -> Result<LoadResult, CoordinatorError> {
        let projects = match &request.target {
            ViewTarget::Active(project_id) => vec![project_id.clone()],
            ViewTarget::Consolidated => self
                .directory
                .projects()?
                .into_iter()
                .map(|p| p.id)
                .collect(),
        };

        let mut result = LoadResult {
            request: request.clone(),
            projects: projects.clone(),
            phases: Vec::new(),
            warnings: Vec::new(),
            unsaved: Vec::new(),
        };
        for project_id in projects {
            let timeline = self.load_or_seed(&project_id)?;
            result.phases.extend(timeline.phases);
            result.warnings.extend(timeline.warnings);
            if timeline.unsaved {
                result.unsaved.push(project_id);
            }
        }
        Ok(result)
    }
}

/// Owns the Active/Consolidated view state and its sync bus.
pub struct ViewCoordinator {
    loader: TimelineLoader,
    bus: SyncBus,
    load_timeout: Option<Duration>,
    generation: u64,
    target: Option<ViewTarget>,
    context: Option<ViewContext>,
    projects: Vec<String>,
    working_set: Vec<Phase>,
    warnings: Vec<ScheduleWarning>,
    /// Projects whose last save failed, with the full list still to write.
    dirty: BTreeMap<String, Vec<Phase>>,
}

impl ViewCoordinator {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        estimates: Arc<dyn EstimationSource>,
        directory: Arc<dyn ProjectDirectory>,
        config: CoordinatorConfig,
    ) -> Self {
        let mut bus = SyncBus::new();
        if let Some(threshold) = config.slow_listener_threshold {
            bus = bus.with_slow_listener_threshold(threshold);
        }
        Self {
            loader: TimelineLoader {
                store,
                estimates,
                directory,
                project_start: config.project_start,
            },
            bus,
            load_timeout: config.load_timeout,
            generation: 0,
            target: None,
            context: None,
            projects: Vec::new(),
            working_set: Vec::new(),
            warnings: Vec::new(),
            dirty: BTreeMap::new(),
        }
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn loader(&self) -> TimelineLoader {
        self.loader.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> Option<&ViewTarget> {
        self.target.as_ref()
    }

    pub fn context(&self) -> Option<&ViewContext> {
        self.context.as_ref()
    }

    /// Restore the persisted view context (or default to the first known
    /// project) and load it.
    pub fn open(&mut self) -> Result<Applied, CoordinatorError> {
        let persisted = match self.loader.store.load_context() {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read view context, using default");
                None
            }
        };
        let context = match persisted {
            Some(context) => context,
            None => {
                let first = self
                    .loader
                    .directory
                    .projects()?
                    .into_iter()
                    .next()
                    .ok_or(CoordinatorError::NoProjects)?;
                ViewContext::active(first.id)
            }
        };
        tracing::info!(
            project = %context.selected_project_id,
            mode = ?context.view_mode,
            "opening view"
        );
        let target = ViewTarget::from_context(&context);
        self.context = Some(context);
        self.switch_to(target)
    }

    /// Start a load for `target`, superseding any load still in flight.
    pub fn request(&mut self, target: ViewTarget) -> LoadRequest {
        self.generation += 1;
        tracing::debug!(generation = self.generation, ?target, "view load requested");
        LoadRequest {
            generation: self.generation,
            target,
            issued_at: Instant::now(),
        }
    }

    /// Install `result` if it answers the most recent request.
    pub fn apply(&mut self, result: LoadResult) -> Applied {
        if result.request.generation != self.generation {
            tracing::debug!(
                generation = result.request.generation,
                current = self.generation,
                "dropping stale view load"
            );
            return Applied::Stale {
                generation: result.request.generation,
                current: self.generation,
            };
        }
        let elapsed = result.request.issued_at.elapsed();
        if let Some(timeout) = self.load_timeout {
            if elapsed > timeout {
                tracing::warn!(
                    generation = result.request.generation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "dropping view load that exceeded timeout"
                );
                return Applied::TimedOut { elapsed };
            }
        }

        for warning in &result.warnings {
            tracing::warn!(%warning, "schedule adjusted");
        }
        self.warnings.extend(result.warnings);
        for project_id in result.unsaved {
            if !self.dirty.contains_key(&project_id) {
                let phases = result
                    .phases
                    .iter()
                    .filter(|p| p.project_id == project_id)
                    .cloned()
                    .collect();
                self.dirty.insert(project_id, phases);
            }
        }

        let target = result.request.target;
        let selected = match &target {
            ViewTarget::Active(project_id) => Some(project_id.clone()),
            ViewTarget::Consolidated => self
                .context
                .as_ref()
                .map(|c| c.selected_project_id.clone())
                .or_else(|| result.projects.first().cloned()),
        };
        self.projects = result.projects;
        self.working_set = result.phases;
        // The store is behind for dirty projects; keep the unsaved lists.
        let unsaved: Vec<(String, Vec<Phase>)> = self
            .dirty
            .iter()
            .filter(|(project_id, _)| self.projects.contains(project_id))
            .map(|(project_id, phases)| (project_id.clone(), phases.clone()))
            .collect();
        for (project_id, phases) in unsaved {
            self.replace_project_phases(&project_id, phases);
        }
        tracing::info!(
            ?target,
            phases = self.working_set.len(),
            generation = self.generation,
            "view loaded"
        );
        self.target = Some(target.clone());

        if let Some(selected) = selected {
            let context = ViewContext {
                selected_project_id: selected,
                view_mode: target.mode(),
            };
            if let Err(e) = self.loader.store.save_context(&context) {
                tracing::warn!(error = %e, "failed to persist view context");
            }
            self.bus.publish(&SyncEvent::context_updated(&context));
            self.context = Some(context);
        }
        Applied::Current
    }

    /// Request, fetch and apply in one go.
    pub fn switch_to(&mut self, target: ViewTarget) -> Result<Applied, CoordinatorError> {
        let request = self.request(target);
        let result = self.loader.fetch(&request)?;
        Ok(self.apply(result))
    }

    pub fn select_project(&mut self, project_id: impl Into<String>) -> Result<Applied, CoordinatorError> {
        self.switch_to(ViewTarget::Active(project_id.into()))
    }

    pub fn show_consolidated(&mut self) -> Result<Applied, CoordinatorError> {
        self.switch_to(ViewTarget::Consolidated)
    }

    /// Re-read the current view from the store.
    pub fn refresh(&mut self) -> Result<Applied, CoordinatorError> {
        let target = self.target.clone().ok_or(CoordinatorError::NotOpen)?;
        self.switch_to(target)
    }

    fn is_visible(&self, phase: &Phase) -> bool {
        match &self.target {
            Some(ViewTarget::Active(project_id)) => phase.project_id == *project_id,
            Some(ViewTarget::Consolidated) => true,
            None => false,
        }
    }

    /// Phases the current view may show or edit.
    pub fn visible_phases(&self) -> Vec<&Phase> {
        self.working_set
            .iter()
            .filter(|p| self.is_visible(p))
            .collect()
    }

    pub fn phase(&self, phase_id: Uuid) -> Option<&Phase> {
        self.working_set
            .iter()
            .find(|p| p.id == phase_id && self.is_visible(p))
    }

    /// Project ids covered by the current view.
    pub fn projects(&self) -> &[String] {
        &self.projects
    }

    /// Bar geometry for the visible phases.
    pub fn layout(&self, today: NaiveDate) -> GanttLayout {
        let phases: Vec<Phase> = self.visible_phases().into_iter().cloned().collect();
        compute_layout(&phases, today)
    }

    /// Scheduling adjustments seen since the last [`take_warnings`](Self::take_warnings).
    pub fn warnings(&self) -> &[ScheduleWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ScheduleWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Projects with in-memory changes the store has not accepted yet.
    pub fn pending_saves(&self) -> impl Iterator<Item = &str> {
        self.dirty.keys().map(String::as_str)
    }

    /// The list to save for `project_id`: the working set while the project
    /// is loaded, otherwise the copy kept when its save failed.
    fn project_phases(&self, project_id: &str) -> Vec<Phase> {
        if !self.projects.iter().any(|p| p == project_id) {
            return self.dirty.get(project_id).cloned().unwrap_or_default();
        }
        self.working_set
            .iter()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Swap `project_id`'s phases in the working set, keeping its position.
    fn replace_project_phases(&mut self, project_id: &str, phases: Vec<Phase>) {
        let at = self
            .working_set
            .iter()
            .position(|p| p.project_id == project_id)
            .unwrap_or(self.working_set.len());
        self.working_set.retain(|p| p.project_id != project_id);
        let tail = self.working_set.split_off(at.min(self.working_set.len()));
        self.working_set.extend(phases);
        self.working_set.extend(tail);
    }

    /// Record when a phase actually ran.
    ///
    /// `None` leaves that date as it was, so recorded dates are never
    /// cleared. Once both dates are set the phase is completed, its progress
    /// becomes 100 and it can no longer be edited. The owning project's full
    /// list is saved, then a `TimelineUpdated` event is published. If the
    /// save fails the edit stays in memory, the project is queued for
    /// [`retry_pending_saves`](Self::retry_pending_saves) and nothing is published.
    pub fn update_phase_actual_dates(
        &mut self,
        phase_id: Uuid,
        actual_start: Option<NaiveDate>,
        actual_end: Option<NaiveDate>,
    ) -> Result<Phase, CoordinatorError> {
        let index = self
            .working_set
            .iter()
            .position(|p| p.id == phase_id && self.is_visible(p))
            .ok_or(CoordinatorError::PhaseNotFound(phase_id))?;

        let phase = &self.working_set[index];
        if phase.is_completed() {
            return Err(CoordinatorError::PhaseCompleted {
                phase_id,
                name: phase.name.clone(),
            });
        }
        let start = actual_start.or(phase.actual_start);
        let end = actual_end.or(phase.actual_end);
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(CoordinatorError::InvalidActualRange { start, end });
            }
        }

        let phase = &mut self.working_set[index];
        phase.actual_start = start;
        phase.actual_end = end;
        if phase.actual_range().is_some() {
            phase.progress_percentage = 100;
        }
        let updated = phase.clone();
        tracing::info!(
            project = %updated.project_id,
            phase = %updated.name,
            status = updated.status().label(),
            "actual dates recorded"
        );

        self.persist(&updated.project_id)?;
        Ok(updated)
    }

    /// Save `project_id` and tell the other views.
    fn persist(&mut self, project_id: &str) -> Result<PublishReport, CoordinatorError> {
        let phases = self.project_phases(project_id);
        if let Err(source) = self.loader.store.save(project_id, &phases) {
            tracing::warn!(project = %project_id, error = %source, "timeline save failed");
            self.dirty.insert(project_id.to_string(), phases);
            return Err(CoordinatorError::Save {
                project_id: project_id.to_string(),
                source,
            });
        }
        self.dirty.remove(project_id);
        Ok(self.bus.publish(&SyncEvent::TimelineUpdated {
            project_id: project_id.to_string(),
            phases,
        }))
    }

    /// Save every project whose earlier save failed. Stops at the first
    /// failure; returns how many projects were saved.
    pub fn retry_pending_saves(&mut self) -> Result<usize, CoordinatorError> {
        let pending: Vec<String> = self.dirty.keys().cloned().collect();
        let mut saved = 0;
        for project_id in pending {
            self.persist(&project_id)?;
            saved += 1;
        }
        Ok(saved)
    }

    /// Take in a timeline another view published.
    ///
    /// Only projects already in the working set are replaced, and never one
    /// with unsaved local edits. Returns whether anything changed.
    pub fn absorb(&mut self, event: &SyncEvent) -> bool {
        let SyncEvent::TimelineUpdated { project_id, phases } = event else {
            return false;
        };
        if !self.projects.iter().any(|p| p == project_id) {
            return false;
        }
        if self.dirty.contains_key(project_id) {
            tracing::warn!(project = %project_id, "ignoring remote timeline over unsaved edits");
            return false;
        }

        let owned: Vec<Phase> = phases
            .iter()
            .filter(|p| p.project_id == *project_id)
            .cloned()
            .collect();
        if owned.len() != phases.len() {
            tracing::warn!(
                project = %project_id,
                dropped = phases.len() - owned.len(),
                "ignoring phases of other projects in remote timeline"
            );
        }
        tracing::debug!(project = %project_id, phases = owned.len(), "absorbed remote timeline");
        self.replace_project_phases(project_id, owned);
        true
    }
}
