use serde::{Deserialize, Serialize};

/// A known project. Owns its phase list through the timeline store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Which slice of the portfolio the views are showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// One selected project.
    #[default]
    Active,
    /// Every known project, flattened.
    Consolidated,
}

/// The persisted selection shared by every view in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContext {
    pub selected_project_id: String,
    #[serde(default)]
    pub view_mode: ViewMode,
}

impl ViewContext {
    pub fn active(project_id: impl Into<String>) -> Self {
        Self {
            selected_project_id: project_id.into(),
            view_mode: ViewMode::Active,
        }
    }

    pub fn consolidated(selected_project_id: impl Into<String>) -> Self {
        Self {
            selected_project_id: selected_project_id.into(),
            view_mode: ViewMode::Consolidated,
        }
    }
}
