//! End-to-end request handling against the in-memory loop driver.
//!
//! The test plays the event loop: it allocates descriptors, pushes inbound
//! bytes through the dispatcher and feeds recorded close requests back as
//! close events.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use http::Method;

use wisp_core::sim::SimDriver;
use wisp_core::{Dispatcher, Fd};
use wisp_http::{parse_query, HttpService, Respond, Router};

struct Server {
    driver: Rc<RefCell<SimDriver>>,
    dispatcher: Rc<Dispatcher>,
    router: Rc<RefCell<Router>>,
}

fn serve(router: Router) -> Server {
    let driver = Rc::new(RefCell::new(SimDriver::new()));
    let dispatcher = Dispatcher::new(driver.clone(), 0);
    let service = HttpService::builder().router(router).build().unwrap();
    service.install(&dispatcher);
    let router = service.router();
    Server { driver, dispatcher, router }
}

impl Server {
    fn open(&self) -> Fd {
        self.driver.borrow_mut().alloc_fd()
    }

    fn send(&self, fd: Fd, bytes: &[u8]) {
        self.dispatcher.on_data(fd, Bytes::copy_from_slice(bytes));
    }

    fn received(&self, fd: Fd) -> String {
        String::from_utf8(self.driver.borrow().output(fd)).unwrap()
    }

    fn close_requested(&self, fd: Fd) -> bool {
        self.driver.borrow().close_requested(fd)
    }

    /// Deliver recorded close requests back into the dispatcher, as the
    /// loop would.
    fn pump_closes(&self) {
        let closed = self.driver.borrow_mut().take_closed();
        for fd in closed {
            self.dispatcher.on_close(fd);
        }
    }
}

fn ok_response(connection: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nConnection: {connection}\r\nContent-type: text/plain\r\nContent-length: {}\r\n\r\n{body}",
        body.len()
    )
}

#[test]
fn keep_alive_processes_two_requests_in_order() {
    let mut router = Router::new();
    router.register(Method::GET, "/a", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", b"A");
    });
    router.register(Method::GET, "/b", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", b"B");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");

    let expected = format!("{}{}", ok_response("keep-alive", "A"), ok_response("close", "B"));
    assert_eq!(server.received(fd), expected);
    assert!(server.close_requested(fd));

    server.pump_closes();
    assert_eq!(server.dispatcher.socket_count(), 0);
}

#[test]
fn post_body_reaches_the_handler() {
    let seen = Rc::new(RefCell::new(None));
    let log = seen.clone();

    let mut router = Router::new();
    router.register(Method::POST, "/e", move |socket, _query, headers, body| {
        let length = headers.get("content-length").unwrap().to_str().unwrap().to_string();
        *log.borrow_mut() = Some((length, body.clone()));
        socket.http_response("200 OK", "text/plain", b"ok");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"POST /e HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello");

    assert_eq!(*seen.borrow(), Some(("5".to_string(), Bytes::from_static(b"hello"))));
    assert_eq!(server.received(fd), ok_response("close", "ok"));
    assert!(server.close_requested(fd));
}

#[test]
fn missing_route_gets_404_and_close() {
    let server = serve(Router::new());

    let fd = server.open();
    server.send(fd, b"GET /nope HTTP/1.1\r\n\r\n");

    let body = "/nope was not found on this server";
    let expected = format!(
        "HTTP/1.1 404 Not found\r\nConnection: close\r\nContent-type: text/plain\r\nContent-length: {}\r\n\r\n{body}",
        body.len()
    );
    assert_eq!(server.received(fd), expected);
    assert!(server.close_requested(fd));
}

#[test]
fn request_split_across_arbitrary_chunks() {
    let mut router = Router::new();
    router.register(Method::GET, "/a", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", b"A");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"GET /a HT");
    server.send(fd, b"TP/1.1\r\nHost: x\r");
    assert_eq!(server.received(fd), "");
    server.send(fd, b"\n\r");
    server.send(fd, b"\n");

    assert_eq!(server.received(fd), ok_response("keep-alive", "A"));
    assert!(!server.close_requested(fd));
}

#[test]
fn query_string_is_passed_raw() {
    let seen = Rc::new(RefCell::new(None));
    let log = seen.clone();

    let mut router = Router::new();
    router.register(Method::GET, "/q", move |socket, query, _headers, _body| {
        *log.borrow_mut() = Some(query.to_string());
        socket.http_response("200 OK", "text/plain", b"ok");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"GET /q?a=1&b=hello+world%21 HTTP/1.1\r\nConnection: close\r\n\r\n");

    let raw = seen.borrow().clone().unwrap();
    assert_eq!(raw, "a=1&b=hello+world%21");

    let decoded = parse_query(&raw);
    assert_eq!(decoded["a"], "1");
    assert_eq!(decoded["b"], "hello world!");
}

#[test]
fn malformed_content_length_closes_without_response() {
    let server = serve(Router::new());

    let fd = server.open();
    server.send(fd, b"POST /e HTTP/1.1\r\nContent-Length: five\r\n\r\n");

    assert_eq!(server.received(fd), "");
    assert!(server.close_requested(fd));
}

#[test]
fn garbage_start_line_closes_without_response() {
    let server = serve(Router::new());

    let fd = server.open();
    server.send(fd, b"definitely not http\r\n\r\n");

    assert_eq!(server.received(fd), "");
    assert!(server.close_requested(fd));
}

#[test]
fn peer_close_before_full_header_ends_quietly() {
    let server = serve(Router::new());

    let fd = server.open();
    server.send(fd, b"GET /a HTTP/1.1\r\nHos");
    server.dispatcher.on_close(fd);

    assert_eq!(server.received(fd), "");
    assert_eq!(server.dispatcher.socket_count(), 0);
}

#[test]
fn handler_panic_keeps_the_connection_alive() {
    let mut router = Router::new();
    router.register(Method::GET, "/boom", |_socket, _query, _headers, _body| {
        panic!("handler bug");
    });
    router.register(Method::GET, "/ok", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", b"fine");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"GET /boom HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(server.received(fd), "");
    assert!(!server.close_requested(fd));

    server.send(fd, b"GET /ok HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    assert_eq!(server.received(fd), ok_response("close", "fine"));
}

#[test]
fn routes_are_replaceable_under_live_connections() {
    let mut router = Router::new();
    router.register(Method::GET, "/a", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", b"old");
    });
    let server = serve(router);

    let fd = server.open();
    server.send(fd, b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(server.received(fd), ok_response("keep-alive", "old"));

    {
        let mut routes = server.router.borrow_mut();
        routes.clear();
        routes.register(Method::GET, "/a", |socket, _query, _headers, _body| {
            socket.http_response("200 OK", "text/plain", b"new");
        });
    }

    // same connection, same registry entry, new table
    server.send(fd, b"GET /a HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    let expected = format!("{}{}", ok_response("keep-alive", "old"), ok_response("close", "new"));
    assert_eq!(server.received(fd), expected);
    assert_eq!(server.dispatcher.socket_count(), 1);

    server.pump_closes();
    assert_eq!(server.dispatcher.socket_count(), 0);
}

#[test]
fn backpressure_preserves_byte_order_across_responses() {
    let mut router = Router::new();
    router.register(Method::GET, "/big", |socket, _query, _headers, _body| {
        socket.http_response("200 OK", "text/plain", &[b'x'; 1000]);
    });
    let server = serve(router);

    let fd = server.open();
    // the driver takes only part of the first response write
    server.driver.borrow_mut().limit_writes(fd, [40]);
    server.send(fd, b"GET /big HTTP/1.1\r\nHost: x\r\n\r\nGET /big HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");

    assert_eq!(server.received(fd).len(), 40);

    // writability drains both queued responses in order
    server.dispatcher.on_write(fd);
    let body = "x".repeat(1000);
    let expected = format!("{}{}", ok_response("keep-alive", &body), ok_response("close", &body));
    assert_eq!(server.received(fd), expected);
    assert!(server.close_requested(fd));
}
