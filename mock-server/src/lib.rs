use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use quick_xml::escape::escape;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub const ENDPOINT: &str = "/api/2.1/xml-in";

const NAMESPACE: &str = "http://www.example-service.com/api/";
const DEFAULT_PER_PAGE: u32 = 25;
const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub id: u64,
    pub organization: String,
}

#[derive(Clone, Debug)]
pub struct ProjectRecord {
    pub id: u64,
    pub client_id: Option<u64>,
    pub name: String,
    pub task_ids: Vec<u64>,
    pub staff_ids: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct TaskRecord {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct StaffRecord {
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntryRecord {
    pub id: u64,
    pub project_id: u64,
    pub task_id: u64,
    pub staff_id: u64,
    pub date: String,
    pub notes: String,
    pub hours: f64,
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub clients: Vec<ClientRecord>,
    pub projects: Vec<ProjectRecord>,
    pub tasks: Vec<TaskRecord>,
    pub staff: Vec<StaffRecord>,
}

impl Dataset {
    /// `clients` numbered clients, plus a small fixed set of projects, tasks
    /// and staff that reference each other.
    pub fn sample(clients: u64) -> Self {
        Self {
            clients: (1..=clients)
                .map(|id| ClientRecord { id, organization: format!("Client {id}") })
                .collect(),
            projects: vec![
                ProjectRecord {
                    id: 1,
                    client_id: Some(1),
                    name: "Website".to_string(),
                    task_ids: vec![1, 2],
                    staff_ids: vec![1, 2],
                },
                ProjectRecord {
                    id: 2,
                    client_id: None,
                    name: "Internal".to_string(),
                    task_ids: vec![2],
                    staff_ids: vec![1],
                },
            ],
            tasks: vec![
                TaskRecord { id: 1, name: "Design".to_string() },
                TaskRecord { id: 2, name: "Development".to_string() },
            ],
            staff: vec![
                StaffRecord {
                    id: 1,
                    email: "ada@example.com".to_string(),
                    first_name: "Ada".to_string(),
                    last_name: "Lovelace".to_string(),
                },
                StaffRecord {
                    id: 2,
                    email: "alan@example.com".to_string(),
                    first_name: "Alan".to_string(),
                    last_name: "Turing".to_string(),
                },
            ],
        }
    }
}

/// A request the server received, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub method: String,
    pub page: Option<u32>,
}

/// A failure to inject instead of the normal answer.
#[derive(Clone, Debug)]
pub enum Failure {
    /// Answer `page` of `method` with a bare HTTP status.
    Status { method: String, page: u32, status: u16 },
    /// Answer every call to `method` with an error envelope.
    Remote { method: String, message: String },
}

#[derive(Debug, Default)]
pub struct MockState {
    pub dataset: Dataset,
    pub time_entries: BTreeMap<u64, TimeEntryRecord>,
    pub calls: Vec<Call>,
    pub failures: Vec<Failure>,
    next_time_entry_id: u64,
}

impl MockState {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            next_time_entry_id: 1,
            ..Self::default()
        }
    }

    pub fn fail_page(&mut self, method: &str, page: u32, status: u16) {
        self.failures.push(Failure::Status {
            method: method.to_string(),
            page,
            status,
        });
    }

    pub fn fail_remote(&mut self, method: &str, message: &str) {
        self.failures.push(Failure::Remote {
            method: method.to_string(),
            message: message.to_string(),
        });
    }
}

pub type Db = Arc<RwLock<MockState>>;

pub fn db(dataset: Dataset) -> Db {
    Arc::new(RwLock::new(MockState::new(dataset)))
}

pub fn app(db: Db) -> Router {
    Router::new().route(ENDPOINT, post(xml_in)).with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app(db)).await
}

#[derive(Debug, Deserialize)]
struct IncomingRequest {
    #[serde(rename = "@method")]
    method: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
    #[serde(default)]
    time_entry: Option<IncomingTimeEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct IncomingTimeEntry {
    #[serde(default)]
    time_entry_id: u64,
    #[serde(default)]
    project_id: u64,
    #[serde(default)]
    task_id: u64,
    #[serde(default)]
    staff_id: u64,
    #[serde(default)]
    date: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    hours: f64,
}

async fn xml_in(State(db): State<Db>, headers: HeaderMap, body: String) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let request: IncomingRequest = match quick_xml::de::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejecting malformed request");
            return xml(fail("Invalid XML request.", None, None));
        }
    };

    let mut state = db.write().await;
    let page = request.page.unwrap_or(1).max(1);
    state.calls.push(Call {
        method: request.method.clone(),
        page: request.page,
    });
    info!(method = %request.method, page, "handling request");

    for failure in &state.failures {
        match failure {
            Failure::Status { method, page: p, status } if *method == request.method && *p == page => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return status.into_response();
            }
            Failure::Remote { method, message } if *method == request.method => {
                return xml(fail(message, None, None));
            }
            _ => {}
        }
    }

    let per_page = request.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let body = match request.method.as_str() {
        "client.list" => list("clients", &state.dataset.clients, page, per_page, client_xml),
        "project.list" => list("projects", &state.dataset.projects, page, per_page, project_xml),
        "task.list" => list("tasks", &state.dataset.tasks, page, per_page, task_xml),
        "staff.list" => list("staff_members", &state.dataset.staff, page, per_page, staff_xml),
        "time_entry.create" => create_time_entry(&mut state, request.time_entry.unwrap_or_default()),
        "time_entry.update" => update_time_entry(&mut state, request.time_entry.unwrap_or_default()),
        other => fail(&format!("Unknown method: {other}"), None, None),
    };
    xml(body)
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn envelope(status: &str, inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<response xmlns=\"{NAMESPACE}\" status=\"{status}\">{inner}</response>"
    )
}

fn fail(message: &str, code: Option<&str>, field: Option<&str>) -> String {
    let mut inner = format!("<error>{}</error>", escape(message));
    if let Some(code) = code {
        inner.push_str(&format!("<code>{code}</code>"));
    }
    if let Some(field) = field {
        inner.push_str(&format!("<field>{field}</field>"));
    }
    envelope("fail", &inner)
}

fn list<T>(tag: &str, records: &[T], page: u32, per_page: u32, render: fn(&T) -> String) -> String {
    let total = records.len();
    let per_page_len = per_page as usize;
    let pages = total.div_ceil(per_page_len).max(1);
    let items: String = records
        .iter()
        .skip((page as usize - 1) * per_page_len)
        .take(per_page_len)
        .map(render)
        .collect();
    envelope(
        "ok",
        &format!(r#"<{tag} page="{page}" per_page="{per_page}" pages="{pages}" total="{total}">{items}</{tag}>"#),
    )
}

fn client_xml(c: &ClientRecord) -> String {
    format!(
        "<client><client_id>{}</client_id><organization>{}</organization></client>",
        c.id,
        escape(&c.organization)
    )
}

fn project_xml(p: &ProjectRecord) -> String {
    let client_id = p.client_id.map(|id| id.to_string()).unwrap_or_default();
    let tasks: String = p
        .task_ids
        .iter()
        .map(|id| format!("<task><task_id>{id}</task_id></task>"))
        .collect();
    let staff: String = p
        .staff_ids
        .iter()
        .map(|id| format!("<staff><staff_id>{id}</staff_id></staff>"))
        .collect();
    format!(
        "<project><project_id>{}</project_id><name>{}</name><client_id>{client_id}</client_id><tasks>{tasks}</tasks><staff>{staff}</staff></project>",
        p.id,
        escape(&p.name)
    )
}

fn task_xml(t: &TaskRecord) -> String {
    format!("<task><task_id>{}</task_id><name>{}</name></task>", t.id, escape(&t.name))
}

fn staff_xml(s: &StaffRecord) -> String {
    format!(
        "<member><staff_id>{}</staff_id><email>{}</email><first_name>{}</first_name><last_name>{}</last_name></member>",
        s.id,
        escape(&s.email),
        escape(&s.first_name),
        escape(&s.last_name)
    )
}

/// Check the fields the service requires, returning the failure envelope
/// for the first one that is missing or unknown.
fn validate(dataset: &Dataset, entry: &IncomingTimeEntry) -> Result<(), String> {
    if !dataset.projects.iter().any(|p| p.id == entry.project_id) {
        return Err(fail("Invalid project_id specified.", Some("40010"), Some("project_id")));
    }
    if !dataset.tasks.iter().any(|t| t.id == entry.task_id) {
        return Err(fail("Invalid task_id specified.", Some("40010"), Some("task_id")));
    }
    if !dataset.staff.iter().any(|s| s.id == entry.staff_id) {
        return Err(fail("Invalid staff_id specified.", Some("40010"), Some("staff_id")));
    }
    if entry.date.is_empty() {
        return Err(fail("Date is required.", Some("40030"), Some("date")));
    }
    Ok(())
}

fn record(id: u64, entry: IncomingTimeEntry) -> TimeEntryRecord {
    TimeEntryRecord {
        id,
        project_id: entry.project_id,
        task_id: entry.task_id,
        staff_id: entry.staff_id,
        date: entry.date,
        notes: entry.notes,
        hours: entry.hours,
    }
}

fn create_time_entry(state: &mut MockState, entry: IncomingTimeEntry) -> String {
    if let Err(body) = validate(&state.dataset, &entry) {
        return body;
    }
    let id = state.next_time_entry_id;
    state.next_time_entry_id += 1;
    state.time_entries.insert(id, record(id, entry));
    envelope("ok", &format!("<time_entry_id>{id}</time_entry_id>"))
}

fn update_time_entry(state: &mut MockState, entry: IncomingTimeEntry) -> String {
    let id = entry.time_entry_id;
    if !state.time_entries.contains_key(&id) {
        return fail("Time entry not found.", Some("40020"), Some("time_entry_id"));
    }
    if let Err(body) = validate(&state.dataset, &entry) {
        return body;
    }
    state.time_entries.insert(id, record(id, entry));
    envelope("ok", "")
}
