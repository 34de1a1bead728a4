//! Paginating client for the accounting service.
//!
//! # Design
//! `Api` owns its configuration, its transport and one `Accumulators` value.
//! Listing a resource walks pages 1, 2, ... in a loop, appending each page to
//! that resource's accumulator, until the cursor says nothing remains. The
//! first failure ends the walk; pages already appended stay appended.
//!
//! Accumulators only ever grow. Calling `clients()` twice appends the full
//! client list twice, and every accessor returns the whole container.
//!
//! Requests are built and responses parsed by public `build_*` / `parse_*`
//! methods, so a host that wants to do its own I/O can skip `Transport`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::envelope::{
    decode_list_response, decode_time_entry_response, encode_list_request, encode_time_entry_request,
    ListResource, Pagination, TIME_ENTRY_CREATE, TIME_ENTRY_UPDATE,
};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{Client, Project, Task, TimeEntry, User};

/// Items requested per page. Fixed for the lifetime of an `Api`.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// The service ignores the password half of basic auth for token logins.
const TOKEN_PASSWORD: &str = "X";

/// Everything an `Api` has listed so far, in the order it was received.
#[derive(Debug, Clone, Default)]
pub struct Accumulators {
    pub clients: Vec<Client>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub users: Vec<User>,
}

/// The outcome of a list accessor: the whole accumulator, plus the error that
/// stopped this run, if any.
#[derive(Debug)]
pub struct Collected<'a, T> {
    pub items: &'a [T],
    pub error: Option<ApiError>,
}

impl<'a, T> Collected<'a, T> {
    pub fn into_result(self) -> Result<&'a [T], ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

/// Client for one account.
///
/// Not synchronized: share it across threads only behind external locking.
#[derive(Debug)]
pub struct Api<T = UreqTransport> {
    url: String,
    token: String,
    per_page: u32,
    accumulators: Accumulators,
    transport: T,
}

impl Api<UreqTransport> {
    /// Client for `https://{account}.example-service.com`, authenticating
    /// with `token`.
    pub fn new(account: &str, token: &str) -> Self {
        let url = format!("https://{account}.example-service.com/api/2.1/xml-in");
        Self::with_transport(&url, token, UreqTransport::new())
    }
}

impl<T: Transport> Api<T> {
    /// Client for an explicit endpoint URL and transport.
    pub fn with_transport(url: &str, token: &str, transport: T) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
            per_page: DEFAULT_PER_PAGE,
            accumulators: Accumulators::default(),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// The accumulators as they stand, without fetching.
    pub fn accumulated(&self) -> &Accumulators {
        &self.accumulators
    }

    pub fn clients(&mut self) -> Collected<'_, Client> {
        self.collect()
    }

    pub fn projects(&mut self) -> Collected<'_, Project> {
        self.collect()
    }

    pub fn tasks(&mut self) -> Collected<'_, Task> {
        self.collect()
    }

    pub fn users(&mut self) -> Collected<'_, User> {
        self.collect()
    }

    fn collect<R: ListResource>(&mut self) -> Collected<'_, R> {
        let error = self.fetch_all::<R>().err();
        Collected {
            items: R::accumulated(&self.accumulators),
            error,
        }
    }

    /// Fetch every page of `R` starting at page 1 and append it to `R`'s
    /// accumulator. Returns how many items this run appended.
    pub fn fetch_all<R: ListResource>(&mut self) -> Result<usize, ApiError> {
        let mut page = 1;
        let mut appended = 0;
        loop {
            debug!(method = R::METHOD, page, "requesting page");
            let (cursor, items) = self
                .fetch_page::<R>(page)
                .inspect_err(|e| warn!(method = R::METHOD, page, error = %e, "list aborted"))?;

            appended += items.len();
            debug!(
                method = R::METHOD,
                page,
                items = items.len(),
                total = cursor.total,
                "page accumulated"
            );
            R::accumulator(&mut self.accumulators).extend(items);

            if !cursor.has_more(page, self.per_page) {
                return Ok(appended);
            }
            page += 1;
        }
    }

    fn fetch_page<R: ListResource>(&self, page: u32) -> Result<(Pagination, Vec<R>), ApiError> {
        let request = self.build_list_request(R::METHOD, page)?;
        let response = self.transport.execute(request)?;
        self.parse_list_response(response)
    }

    /// Create `entry` when its id is 0, update it otherwise. Returns the
    /// entry's id as confirmed by the service.
    pub fn save_time_entry(&self, entry: &TimeEntry) -> Result<u64, ApiError> {
        self.send_time_entry(entry)
            .inspect_err(|e| warn!(id = entry.id, error = %e, "time entry not saved"))
    }

    fn send_time_entry(&self, entry: &TimeEntry) -> Result<u64, ApiError> {
        let request = self.build_time_entry_request(entry)?;
        let response = self.transport.execute(request)?;
        self.parse_time_entry_response(entry, response)
    }

    pub fn build_list_request(&self, method: &str, page: u32) -> Result<HttpRequest, ApiError> {
        let body = encode_list_request(method, page, self.per_page)?;
        Ok(self.post(body))
    }

    pub fn build_time_entry_request(&self, entry: &TimeEntry) -> Result<HttpRequest, ApiError> {
        let method = if entry.is_new() { TIME_ENTRY_CREATE } else { TIME_ENTRY_UPDATE };
        let body = encode_time_entry_request(method, entry)?;
        Ok(self.post(body))
    }

    pub fn parse_list_response<R: ListResource>(
        &self,
        response: HttpResponse,
    ) -> Result<(Pagination, Vec<R>), ApiError> {
        check_status(&response)?;
        let envelope = decode_list_response(&response.body)?;
        Ok(R::extract(envelope))
    }

    /// Updates may come back without an id; the entry's own id is the
    /// confirmed one then.
    pub fn parse_time_entry_response(
        &self,
        entry: &TimeEntry,
        response: HttpResponse,
    ) -> Result<u64, ApiError> {
        check_status(&response)?;
        let envelope = decode_time_entry_response(&response.body)?;
        if envelope.is_ok() {
            return Ok(envelope.time_entry_id.unwrap_or(entry.id));
        }
        Err(envelope.into_error())
    }

    fn post(&self, body: String) -> HttpRequest {
        let credentials = STANDARD.encode(format!("{}:{TOKEN_PASSWORD}", self.token));
        HttpRequest {
            url: self.url.clone(),
            headers: vec![
                ("content-type".to_string(), "application/xml".to_string()),
                ("authorization".to_string(), format!("Basic {credentials}")),
            ],
            body,
        }
    }
}

/// Any non-2xx status is a transport failure.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpStatus {
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    const URL: &str = "http://localhost:3000/api/2.1/xml-in";

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<HttpResponse, ApiError>>>,
        requests: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, ApiError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn bodies(&self) -> Vec<String> {
            self.requests.borrow().iter().map(|r| r.body.clone()).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.borrow_mut().push(request);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted response left"))
        }
    }

    fn ok(body: impl Into<String>) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        })
    }

    fn status(code: u16) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: code,
            headers: Vec::new(),
            body: "unavailable".to_string(),
        })
    }

    /// A `client.list` page holding ids `first..first + count`.
    fn client_page(page: u32, total: u32, first: u64, count: u64) -> String {
        let items: String = (first..first + count)
            .map(|id| format!("<client><client_id>{id}</client_id><organization>Org {id}</organization></client>"))
            .collect();
        format!(
            r#"<response status="ok"><clients page="{page}" per_page="25" total="{total}">{items}</clients></response>"#
        )
    }

    fn entry(id: u64) -> TimeEntry {
        TimeEntry {
            id,
            project_id: 1,
            task_id: 2,
            user_id: 3,
            date: "2024-05-01".to_string(),
            notes: String::new(),
            hours: 2.0,
        }
    }

    #[test]
    fn new_derives_account_url() {
        let api = Api::new("acme", "secret");
        assert_eq!(api.url(), "https://acme.example-service.com/api/2.1/xml-in");
        assert_eq!(api.per_page(), 25);
    }

    #[test]
    fn requests_are_authenticated_xml_posts() {
        let api = Api::with_transport(URL, "token123", ScriptedTransport::default());
        let req = api.build_list_request("task.list", 1).unwrap();
        assert_eq!(req.url, URL);
        assert_eq!(req.header("content-type"), Some("application/xml"));
        let expected = format!("Basic {}", STANDARD.encode("token123:X"));
        assert_eq!(req.header("authorization"), Some(expected.as_str()));
        assert!(req.body.contains(r#"method="task.list""#));
        assert!(req.body.contains("<per_page>25</per_page>"));
    }

    #[test]
    fn second_page_requested_when_total_exceeds_page_size() {
        let script = ScriptedTransport::new(vec![ok(client_page(1, 30, 1, 25)), ok(client_page(2, 30, 26, 5))]);
        let mut api = Api::with_transport(URL, "t", &script);

        let clients = api.clients().into_result().unwrap();
        assert_eq!(clients.len(), 30);
        let ids: Vec<u64> = clients.iter().map(|c| c.id).collect();
        assert_eq!(ids, (1..=30).collect::<Vec<_>>());

        let bodies = script.bodies();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("<page>1</page>"));
        assert!(bodies[1].contains("<page>2</page>"));
    }

    #[test]
    fn no_second_page_when_total_fits() {
        let script = ScriptedTransport::new(vec![ok(client_page(1, 25, 1, 25))]);
        let mut api = Api::with_transport(URL, "t", &script);

        assert_eq!(api.clients().into_result().unwrap().len(), 25);
        assert_eq!(script.requests.borrow().len(), 1);
    }

    #[test]
    fn repeated_calls_append() {
        let script = ScriptedTransport::new(vec![ok(client_page(1, 2, 1, 2)), ok(client_page(1, 2, 1, 2))]);
        let mut api = Api::with_transport(URL, "t", &script);

        assert_eq!(api.clients().into_result().unwrap().len(), 2);
        let clients = api.clients().into_result().unwrap();
        assert_eq!(clients.len(), 4);
        assert_eq!(clients[0], clients[2]);
        assert!(script.bodies()[1].contains("<page>1</page>"));
    }

    #[test]
    fn http_failure_on_page_two_keeps_page_one() {
        let script = ScriptedTransport::new(vec![ok(client_page(1, 60, 1, 25)), status(500)]);
        let mut api = Api::with_transport(URL, "t", &script);

        let collected = api.clients();
        assert_eq!(collected.items.len(), 25);
        assert!(matches!(collected.error, Some(ApiError::HttpStatus { status: 500, .. })));
        assert_eq!(script.requests.borrow().len(), 2);
        assert_eq!(api.accumulated().clients.len(), 25);
    }

    #[test]
    fn network_failure_is_returned_verbatim() {
        let script = ScriptedTransport::new(vec![Err(ApiError::Network("connection refused".into()))]);
        let mut api = Api::with_transport(URL, "t", &script);

        let err = api.users().into_result().unwrap_err();
        assert!(matches!(err, ApiError::Network(ref m) if m == "connection refused"));
        assert!(api.accumulated().users.is_empty());
    }

    #[test]
    fn remote_error_is_not_a_decode_error() {
        let script = ScriptedTransport::new(vec![ok(
            r#"<response status="fail"><error>Your account is suspended.</error></response>"#,
        )]);
        let mut api = Api::with_transport(URL, "t", &script);

        let err = api.projects().into_result().unwrap_err();
        assert!(matches!(err, ApiError::Remote { .. }));
        assert_eq!(err.to_string(), "Your account is suspended.");
    }

    #[test]
    fn malformed_page_is_a_decode_error() {
        let script = ScriptedTransport::new(vec![ok(r#"<response status="ok"><tasks page="one"/></response>"#)]);
        let mut api = Api::with_transport(URL, "t", &script);

        let err = api.tasks().into_result().unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn accessors_keep_separate_accumulators() {
        let tasks = r#"<response status="ok"><tasks page="1" per_page="25" total="1"><task><task_id>9</task_id><name>Design</name></task></tasks></response>"#;
        let script = ScriptedTransport::new(vec![ok(tasks), ok(client_page(1, 1, 1, 1))]);
        let mut api = Api::with_transport(URL, "t", &script);

        api.tasks().into_result().unwrap();
        api.clients().into_result().unwrap();
        let acc = api.accumulated();
        assert_eq!(acc.tasks.len(), 1);
        assert_eq!(acc.tasks[0].name, "Design");
        assert_eq!(acc.clients.len(), 1);
        assert!(acc.projects.is_empty());
        assert!(script.bodies()[0].contains(r#"method="task.list""#));
        assert!(script.bodies()[1].contains(r#"method="client.list""#));
    }

    #[test]
    fn fetch_all_reports_items_appended_this_run() {
        let script = ScriptedTransport::new(vec![ok(client_page(1, 3, 1, 3)), ok(client_page(1, 3, 1, 3))]);
        let mut api = Api::with_transport(URL, "t", &script);

        assert_eq!(api.fetch_all::<Client>().unwrap(), 3);
        assert_eq!(api.fetch_all::<Client>().unwrap(), 3);
        assert_eq!(api.accumulated().clients.len(), 6);
    }

    #[test]
    fn new_entry_is_created() {
        let script = ScriptedTransport::new(vec![ok(r#"<response status="ok"><time_entry_id>211</time_entry_id></response>"#)]);
        let api = Api::with_transport(URL, "t", &script);

        assert_eq!(api.save_time_entry(&entry(0)).unwrap(), 211);
        let body = &script.bodies()[0];
        assert!(body.contains(r#"method="time_entry.create""#));
        assert!(body.contains("<time_entry_id>0</time_entry_id>"));
    }

    #[test]
    fn existing_entry_is_updated() {
        let script = ScriptedTransport::new(vec![
            ok(r#"<response status="ok"><time_entry_id>42</time_entry_id></response>"#),
            ok(r#"<response status="ok"/>"#),
        ]);
        let api = Api::with_transport(URL, "t", &script);

        assert_eq!(api.save_time_entry(&entry(42)).unwrap(), 42);
        assert_eq!(api.save_time_entry(&entry(42)).unwrap(), 42);
        assert!(script.bodies()[0].contains(r#"method="time_entry.update""#));
        assert!(script.bodies()[0].contains("<time_entry_id>42</time_entry_id>"));
    }

    #[test]
    fn failed_save_surfaces_message_and_diagnostics() {
        let script = ScriptedTransport::new(vec![ok(
            r#"<response status="fail"><error>Date is required</error><code>40010</code><field>date</field></response>"#,
        )]);
        let api = Api::with_transport(URL, "t", &script);

        match api.save_time_entry(&entry(0)).unwrap_err() {
            ApiError::Remote { message, code, field } => {
                assert_eq!(message, "Date is required");
                assert_eq!(code.as_deref(), Some("40010"));
                assert_eq!(field.as_deref(), Some("date"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn save_with_bad_status_is_a_transport_error() {
        let script = ScriptedTransport::new(vec![status(401)]);
        let api = Api::with_transport(URL, "t", &script);

        let err = api.save_time_entry(&entry(0)).unwrap_err();
        assert!(err.is_transport());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn network_failure_on_save_is_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let script = ScriptedTransport::new(vec![Err(ApiError::Network("connection reset".into()))]);
        let api = Api::with_transport(URL, "t", &script);
        let err = tracing::subscriber::with_default(subscriber, || api.save_time_entry(&entry(7)).unwrap_err());

        assert!(matches!(err, ApiError::Network(_)));
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("time entry not saved"), "{output}");
        assert!(output.contains("connection reset"), "{output}");
    }
}
