//! Hello Example
//!
//! Wires the HTTP service onto a dispatcher backed by the in-memory
//! simulation driver and replays two requests, printing what the peer would
//! receive. With a native loop driver the wiring is identical: the loop
//! allocates the descriptors and pumps `on_data` / `on_write` / `on_close`
//! instead of this `main`.
//!
//! To run this example:
//! ```bash
//! cargo run --example hello
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use http::Method;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use wisp_core::sim::SimDriver;
use wisp_core::Dispatcher;
use wisp_http::{parse_query, HttpService, Respond, Router};

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut router = Router::new();
    router.register(Method::GET, "/hello", |socket, query, _headers, _body| {
        let name = parse_query(query).remove("name").unwrap_or_else(|| "world".to_string());
        let body = format!("hello, {name}!\n");
        socket.http_response("200 OK", "text/plain", body.as_bytes());
    });
    router.register(Method::POST, "/echo", |socket, _query, _headers, body| {
        socket.http_response("200 OK", "application/octet-stream", &body);
    });

    let driver = Rc::new(RefCell::new(SimDriver::new()));
    let dispatcher = Dispatcher::new(driver.clone(), 0);

    let service = HttpService::builder().router(router).build().unwrap();
    service.install(&dispatcher);

    // play the loop: one connection, two keep-alive requests
    let fd = driver.borrow_mut().alloc_fd();
    dispatcher.on_data(fd, Bytes::from_static(b"GET /hello?name=wisp HTTP/1.1\r\nHost: local\r\n\r\n"));
    dispatcher.on_data(
        fd,
        Bytes::from_static(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\nConnection: close\r\n\r\nbytes"),
    );
    let closed = driver.borrow_mut().take_closed();
    for closed_fd in closed {
        dispatcher.on_close(closed_fd);
    }

    println!("--- peer received ---");
    print!("{}", String::from_utf8_lossy(&driver.borrow().output(fd)));
}
