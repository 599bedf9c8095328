//! Request queue behaviour against a local HTTP backend.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{pump_until, start_mock_backend, unused_addr, MockResponse, TIMEOUT};
use netcore::config::HttpConfig;
use netcore::http::{HttpRequests, Request, RequestQueue, HTTP_BAD_GATEWAY};
use netcore::{Network, NetworkConfig};
use tracing::Span;

type Events = Rc<RefCell<Vec<String>>>;

fn queue() -> RequestQueue {
    RequestQueue::new(&HttpConfig::default(), Span::none()).unwrap()
}

fn recorder(events: &Events, tag: &str) -> (impl FnOnce(Vec<u8>) + 'static, impl FnOnce(u16) + 'static) {
    let ok = events.clone();
    let err = events.clone();
    let ok_tag = tag.to_string();
    let err_tag = tag.to_string();
    (
        move |body: Vec<u8>| ok.borrow_mut().push(format!("{ok_tag}:ok:{}", String::from_utf8_lossy(&body))),
        move |status: u16| err.borrow_mut().push(format!("{err_tag}:reject:{status}")),
    )
}

fn run(queue: &mut RequestQueue, events: &Events, expected: usize) {
    let events = events.clone();
    let done = pump_until(|| queue.update(), || events.borrow().len() >= expected, TIMEOUT);
    assert!(done, "timed out waiting for {expected} completions");
}

#[test]
fn post_delivers_body_and_sends_json() {
    let backend = start_mock_backend(|_| MockResponse::new(200, "ok"));
    let mut queue = queue();
    let events: Events = Rc::default();

    let (on_response, on_reject) = recorder(&events, "a");
    queue.post(backend.url("/api"), r#"{"k":1}"#, on_response, on_reject, 1024);
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec!["a:ok:ok"]);
    assert!(queue.is_idle());

    let recorded = backend.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].path, "/api");
    assert_eq!(recorded[0].body, br#"{"k":1}"#);
    assert_eq!(recorded[0].header("content-type"), Some("application/json"));
    assert_eq!(recorded[0].header("user-agent"), Some("curl/7.81.0"));

    assert!(queue.total_upload() > 7);
    assert!(queue.total_download() > 2);
}

#[test]
fn non_ok_status_rejects_and_next_request_runs() {
    let backend = start_mock_backend(|request| match request.path.as_str() {
        "/missing" => MockResponse::new(404, "nope"),
        _ => MockResponse::new(200, "fine"),
    });
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "first");
    queue.get(backend.url("/missing"), ok, err, 0);
    let (ok, err) = recorder(&events, "second");
    queue.get(backend.url("/present"), ok, err, 0);
    assert_eq!(queue.pending(), 1);

    run(&mut queue, &events, 2);
    assert_eq!(*events.borrow(), vec!["first:reject:404", "second:ok:fine"]);
}

#[test]
fn rejected_response_is_not_counted() {
    let backend = start_mock_backend(|_| MockResponse::new(500, "boom"));
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "x");
    queue.get(backend.url("/"), ok, err, 0);
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec!["x:reject:500"]);
    assert_eq!(queue.total_upload(), 0);
    assert_eq!(queue.total_download(), 0);
}

#[test]
fn requests_complete_in_submission_order() {
    let backend = start_mock_backend(|request| MockResponse::new(200, request.path.clone()));
    let mut queue = queue();
    let events: Events = Rc::default();

    for tag in ["1", "2", "3"] {
        let (ok, err) = recorder(&events, tag);
        queue.get(backend.url(&format!("/{tag}")), ok, err, 0);
    }
    run(&mut queue, &events, 3);

    assert_eq!(*events.borrow(), vec!["1:ok:/1", "2:ok:/2", "3:ok:/3"]);
    let paths: Vec<String> = backend.recorded().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/1", "/2", "/3"]);
}

#[test]
fn oversized_body_rejects_with_bad_gateway() {
    let backend = start_mock_backend(|_| MockResponse::new(200, vec![b'x'; 100]));
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "big");
    queue.get(backend.url("/"), ok, err, 10);
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec![format!("big:reject:{HTTP_BAD_GATEWAY}")]);
    assert_eq!(queue.total_download(), 0);
}

#[test]
fn body_at_limit_is_accepted() {
    let backend = start_mock_backend(|_| MockResponse::new(200, "0123456789"));
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "edge");
    queue.get(backend.url("/"), ok, err, 10);
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec!["edge:ok:0123456789"]);
}

#[test]
fn refused_connection_rejects_with_bad_gateway() {
    let addr = unused_addr();
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "down");
    queue.get(format!("http://{addr}/"), ok, err, 0);
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec!["down:reject:502"]);
}

#[test]
fn redirects_followed_only_when_asked() {
    let backend = start_mock_backend(|request| match request.path.as_str() {
        "/old" => MockResponse::new(302, "").with_header("Location", "/new"),
        _ => MockResponse::new(200, "moved here"),
    });
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "plain");
    queue.enqueue(Request::get(backend.url("/old"), ok, err, 0));
    let (ok, err) = recorder(&events, "follow");
    queue.enqueue(Request::get(backend.url("/old"), ok, err, 0).follow_redirects(true));
    run(&mut queue, &events, 2);

    assert_eq!(*events.borrow(), vec!["plain:reject:302", "follow:ok:moved here"]);
}

#[test]
fn network_totals_include_http_traffic() {
    let backend = start_mock_backend(|_| MockResponse::new(200, "payload"));
    let mut network = Network::new(NetworkConfig::default()).unwrap();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "net");
    network.get(backend.url("/"), ok, err, 0);
    let seen = events.clone();
    assert!(pump_until(|| network.update(), || !seen.borrow().is_empty(), TIMEOUT));

    assert_eq!(*events.borrow(), vec!["net:ok:payload"]);
    assert!(network.total_upload() > 0);
    assert!(network.total_download() >= "payload".len());
}

#[test]
fn temporary_and_permanent_redirects_keep_method_and_body() {
    let backend = start_mock_backend(|request| match request.path.as_str() {
        "/temporary" => MockResponse::new(307, "").with_header("Location", "/permanent"),
        "/permanent" => MockResponse::new(308, "").with_header("Location", "/echo"),
        _ => MockResponse::new(
            200,
            format!("{} {}", request.method, String::from_utf8_lossy(&request.body)),
        ),
    });
    let mut queue = queue();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "kept");
    queue.enqueue(Request::post(backend.url("/temporary"), "xyz", ok, err, 0).follow_redirects(true));
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec!["kept:ok:POST xyz"]);
    let seen: Vec<(String, Vec<u8>)> = backend
        .recorded()
        .into_iter()
        .map(|r| (r.method, r.body))
        .collect();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(method, body)| method == "POST" && body == b"xyz"));
}

#[test]
fn redirect_loop_rejects_after_limit() {
    let backend = start_mock_backend(|_| MockResponse::new(302, "").with_header("Location", "/loop"));
    let config = HttpConfig {
        max_redirects: 2,
        ..HttpConfig::default()
    };
    let mut queue = RequestQueue::new(&config, Span::none()).unwrap();
    let events: Events = Rc::default();

    let (ok, err) = recorder(&events, "loop");
    queue.enqueue(Request::get(backend.url("/loop"), ok, err, 0).follow_redirects(true));
    run(&mut queue, &events, 1);

    assert_eq!(*events.borrow(), vec![format!("loop:reject:{HTTP_BAD_GATEWAY}")]);
    // The first request plus two followed hops.
    assert_eq!(backend.recorded().len(), 3);
    assert_eq!(queue.total_download(), 0);
}
