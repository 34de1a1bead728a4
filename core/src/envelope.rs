//! Request and response envelopes for the XML endpoint.
//!
//! # Design
//! Every call is a `<request method="...">` document. List calls carry
//! `per_page` and `page`; time-entry calls carry a nested `time_entry`.
//! Responses share one root: an optional `error` element plus whichever
//! payload the method produces. Encoding and decoding go through
//! quick-xml's serde support and are pure functions.
//!
//! Decoding distinguishes two failures: bytes that are not an envelope
//! (`ApiError::Decode`) and a valid envelope whose `error` is non-empty
//! (`ApiError::Remote`).

use serde::{Deserialize, Serialize};

use crate::client::Accumulators;
use crate::error::ApiError;
use crate::types::{Client, Project, Task, TimeEntry, User};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

pub const TIME_ENTRY_CREATE: &str = "time_entry.create";
pub const TIME_ENTRY_UPDATE: &str = "time_entry.update";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename = "request")]
struct ListRequest<'a> {
    #[serde(rename = "@method")]
    method: &'a str,
    per_page: u32,
    page: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename = "request")]
struct TimeEntryRequest<'a> {
    #[serde(rename = "@method")]
    method: &'a str,
    time_entry: &'a TimeEntry,
}

/// Encode a list call for one page.
pub fn encode_list_request(method: &str, page: u32, per_page: u32) -> Result<String, ApiError> {
    let request = ListRequest { method, per_page, page };
    let xml = quick_xml::se::to_string(&request).map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok(format!("{XML_DECLARATION}{xml}"))
}

/// Encode a time-entry create or update call. Field values are sent as-is.
pub fn encode_time_entry_request(method: &str, entry: &TimeEntry) -> Result<String, ApiError> {
    let request = TimeEntryRequest { method, time_entry: entry };
    let xml = quick_xml::se::to_string(&request).map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok(format!("{XML_DECLARATION}{xml}"))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// The pagination cursor reported on each list page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u32,
}

impl Pagination {
    /// Whether pages remain after `page`.
    ///
    /// Uses the page size the service reports, falling back to
    /// `requested_per_page` when the service reports zero.
    pub fn has_more(&self, page: u32, requested_per_page: u32) -> bool {
        let per_page = if self.per_page == 0 { requested_per_page } else { self.per_page };
        u64::from(self.total) > u64::from(per_page) * u64::from(page)
    }
}

/// Defines one page-list element: the pagination attributes plus the
/// repeated child records named `$element`.
macro_rules! page_list {
    ($name:ident, $item:ty, $element:tt) => {
        #[derive(Debug, Default, Deserialize)]
        pub struct $name {
            #[serde(rename = "@page", default)]
            pub page: u32,
            #[serde(rename = "@per_page", default)]
            pub per_page: u32,
            #[serde(rename = "@total", default)]
            pub total: u32,
            #[serde(rename = $element, default)]
            pub items: Vec<$item>,
        }

        impl $name {
            /// Split into the cursor and the records, in received order.
            pub fn into_page(self) -> (Pagination, Vec<$item>) {
                let cursor = Pagination {
                    page: self.page,
                    per_page: self.per_page,
                    total: self.total,
                };
                (cursor, self.items)
            }
        }
    };
}

page_list!(ClientList, Client, "client");
page_list!(ProjectList, Project, "project");
page_list!(TaskList, Task, "task");
page_list!(UserList, User, "member");

/// Response envelope for the four list methods.
///
/// Only the element matching the requested method is present; the others
/// stay `None`.
#[derive(Debug, Default, Deserialize)]
pub struct ListResponse {
    #[serde(rename = "@status", default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub clients: Option<ClientList>,
    #[serde(default)]
    pub projects: Option<ProjectList>,
    #[serde(default)]
    pub tasks: Option<TaskList>,
    #[serde(default)]
    pub staff_members: Option<UserList>,
}

/// Response envelope for `time_entry.create` and `time_entry.update`.
#[derive(Debug, Default, Deserialize)]
pub struct TimeEntryResponse {
    #[serde(rename = "@status", default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub time_entry_id: Option<u64>,
}

impl TimeEntryResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// The failure as an `ApiError::Remote`, keeping `code` and `field`.
    pub fn into_error(self) -> ApiError {
        ApiError::Remote {
            message: self.error.unwrap_or_default(),
            code: self.code.filter(|c| !c.is_empty()),
            field: self.field.filter(|f| !f.is_empty()),
        }
    }
}

/// Decode a list response. A non-empty `error` element is a remote error.
pub fn decode_list_response(body: &str) -> Result<ListResponse, ApiError> {
    let envelope: ListResponse =
        quick_xml::de::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    if let Some(message) = envelope.error.as_deref().filter(|m| !m.is_empty()) {
        return Err(ApiError::remote(message));
    }
    Ok(envelope)
}

/// Decode a time-entry response. The `status` attribute is left for the
/// caller to interpret.
pub fn decode_time_entry_response(body: &str) -> Result<TimeEntryResponse, ApiError> {
    quick_xml::de::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// List resources
// ---------------------------------------------------------------------------

/// A resource that can be listed page by page.
///
/// Ties a record type to its list method, to the part of `ListResponse` that
/// carries it, and to the accumulator that collects it.
pub trait ListResource: Sized {
    const METHOD: &'static str;

    /// Take this resource's page out of a decoded response. A response with
    /// no matching element yields an empty page with zero total.
    fn extract(response: ListResponse) -> (Pagination, Vec<Self>);

    fn accumulator(acc: &mut Accumulators) -> &mut Vec<Self>;

    fn accumulated(acc: &Accumulators) -> &[Self];
}

impl ListResource for Client {
    const METHOD: &'static str = "client.list";

    fn extract(response: ListResponse) -> (Pagination, Vec<Self>) {
        response.clients.unwrap_or_default().into_page()
    }

    fn accumulator(acc: &mut Accumulators) -> &mut Vec<Self> {
        &mut acc.clients
    }

    fn accumulated(acc: &Accumulators) -> &[Self] {
        &acc.clients
    }
}

impl ListResource for Project {
    const METHOD: &'static str = "project.list";

    fn extract(response: ListResponse) -> (Pagination, Vec<Self>) {
        response.projects.unwrap_or_default().into_page()
    }

    fn accumulator(acc: &mut Accumulators) -> &mut Vec<Self> {
        &mut acc.projects
    }

    fn accumulated(acc: &Accumulators) -> &[Self] {
        &acc.projects
    }
}

impl ListResource for Task {
    const METHOD: &'static str = "task.list";

    fn extract(response: ListResponse) -> (Pagination, Vec<Self>) {
        response.tasks.unwrap_or_default().into_page()
    }

    fn accumulator(acc: &mut Accumulators) -> &mut Vec<Self> {
        &mut acc.tasks
    }

    fn accumulated(acc: &Accumulators) -> &[Self] {
        &acc.tasks
    }
}

impl ListResource for User {
    const METHOD: &'static str = "staff.list";

    fn extract(response: ListResponse) -> (Pagination, Vec<Self>) {
        response.staff_members.unwrap_or_default().into_page()
    }

    fn accumulator(acc: &mut Accumulators) -> &mut Vec<Self> {
        &mut acc.users
    }

    fn accumulated(acc: &Accumulators) -> &[Self] {
        &acc.users
    }
}
