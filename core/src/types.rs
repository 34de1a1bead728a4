//! Resource records exchanged with the accounting service.
//!
//! # Design
//! Field names follow Rust conventions; serde renames map them onto the
//! service's XML element names. Identifiers always come from the service and
//! are never generated locally. `Project` is decoded through a wire-shaped
//! helper because the service nests task and staff ids two levels deep.

use serde::{Deserialize, Serialize};

/// A customer organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    #[serde(rename = "client_id")]
    pub id: u64,
    #[serde(rename = "organization", default)]
    pub name: String,
}

/// A project, linked to its client and to the tasks and staff assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawProject", into = "RawProject")]
pub struct Project {
    pub id: u64,
    /// Foreign key to `Client::id`. The service sends it as free text, and it
    /// may be empty for internal projects.
    pub client_id: String,
    pub name: String,
    pub task_ids: Vec<u64>,
    pub user_ids: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct RawProject {
    project_id: u64,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tasks: Option<TaskRefs>,
    #[serde(default)]
    staff: Option<StaffRefs>,
}

#[derive(Serialize, Deserialize, Default)]
struct TaskRefs {
    #[serde(default)]
    task: Vec<TaskRef>,
}

#[derive(Serialize, Deserialize)]
struct TaskRef {
    task_id: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct StaffRefs {
    #[serde(default)]
    staff: Vec<StaffRef>,
}

#[derive(Serialize, Deserialize)]
struct StaffRef {
    staff_id: u64,
}

impl From<RawProject> for Project {
    fn from(raw: RawProject) -> Self {
        Self {
            id: raw.project_id,
            client_id: raw.client_id,
            name: raw.name,
            task_ids: raw.tasks.unwrap_or_default().task.into_iter().map(|t| t.task_id).collect(),
            user_ids: raw.staff.unwrap_or_default().staff.into_iter().map(|s| s.staff_id).collect(),
        }
    }
}

impl From<Project> for RawProject {
    fn from(project: Project) -> Self {
        Self {
            project_id: project.id,
            client_id: project.client_id,
            name: project.name,
            tasks: Some(TaskRefs {
                task: project.task_ids.into_iter().map(|task_id| TaskRef { task_id }).collect(),
            }),
            staff: Some(StaffRefs {
                staff: project.user_ids.into_iter().map(|staff_id| StaffRef { staff_id }).collect(),
            }),
        }
    }
}

/// A billable task type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// A staff member. The service calls these "staff"; this crate calls them users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "staff_id")]
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// The one writable resource.
///
/// `id == 0` means the entry does not exist yet and saving it creates it;
/// any other id updates the existing entry. `project_id`, `task_id`,
/// `user_id` and `date` are required by the service, which validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    #[serde(rename = "time_entry_id", default)]
    pub id: u64,
    pub project_id: u64,
    pub task_id: u64,
    #[serde(rename = "staff_id")]
    pub user_id: u64,
    /// `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub hours: f64,
}

impl TimeEntry {
    /// Whether saving this entry creates a new record rather than updating one.
    pub fn is_new(&self) -> bool {
        self.id == 0
    }
}
