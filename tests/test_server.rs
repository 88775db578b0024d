//! End-to-end tests over real TCP sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ferry::context::ServerContext;
use ferry::http::handler::{AsyncCallback, Handler, HandlerResult, make_handler};
use ferry::http::request::Env;
use ferry::http::response::{Body, Reply};
use ferry::http::signal::CloseSignal;
use ferry::server::{listener, serve_connection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const GET: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

async fn start<H: Handler + 'static>(handler: H) -> (SocketAddr, ServerContext) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let context = ServerContext::default();

    tokio::spawn(listener::serve(listener, context.clone(), Arc::new(handler)));
    (addr, context)
}

async fn read_all(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server should close the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}

async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_all(&mut stream).await
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_sync_response_over_tcp() {
    let (addr, _) = start(make_handler(|_env| Ok(Reply::ok("hello").into()))).await;

    let response = roundtrip(addr, GET).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 5\r\n"));
    assert!(response.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_request_split_across_packets() {
    let (addr, _) = start(make_handler(|env: Env| Ok(Reply::ok(env.body).into()))).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for part in [&b"POST /echo HT"[..], b"TP/1.1\r\nContent-Le", b"ngth: 3\r\n\r", b"\nabc"] {
        stream.write_all(part).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = read_all(&mut stream).await;
    assert!(response.ends_with("\r\n\r\nabc"));
}

#[tokio::test]
async fn test_deferred_response_over_tcp() {
    let (addr, context) = start(make_handler(|mut env: Env| {
        let (deferred, callback) = env.defer()?;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            callback.call(Reply::ok("ok")).unwrap();
        });
        Ok(HandlerResult::Deferred(deferred))
    }))
    .await;

    let started = Instant::now();
    let response = roundtrip(addr, GET).await;

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("\r\n\r\nok"));
    assert_eq!(response.matches("HTTP/1.1 ").count(), 1);
    eventually("deferred counter", || context.status.pending_deferred() == 0).await;
}

#[tokio::test]
async fn test_handler_error_over_tcp() {
    let (addr, _) = start(make_handler(|_env| anyhow::bail!("boom"))).await;

    let response = roundtrip(addr, GET).await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(response.ends_with("An error happened"));
}

#[tokio::test]
async fn test_dropped_callback_over_tcp() {
    let (addr, _) = start(make_handler(|mut env: Env| {
        let (deferred, _callback) = env.defer()?;
        Ok(deferred.into())
    }))
    .await;

    let response = roundtrip(addr, GET).await;
    assert!(response.starts_with("HTTP/1.1 500 "));
}

#[tokio::test]
async fn test_malformed_request_over_tcp() {
    let (addr, _) = start(make_handler(|_env| Ok(Reply::ok("never").into()))).await;

    let response = roundtrip(addr, b"HELLO\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn test_streaming_body_over_tcp() {
    let (addr, _) = start(make_handler(|_env| {
        let (sender, body) = Body::channel();
        tokio::spawn(async move {
            for chunk in ["one,", "two,", "three"] {
                sender.send(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        Ok(Reply::ok(body).into())
    }))
    .await;

    let response = roundtrip(addr, GET).await;
    assert!(!response.contains("Content-Length"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\none,two,three"));
}

#[derive(Default)]
struct Pending {
    callback: Option<AsyncCallback>,
    async_close: Option<CloseSignal>,
}

#[tokio::test]
async fn test_disconnect_while_deferred_over_tcp() {
    let pending = Arc::new(Mutex::new(Pending::default()));
    let stash = pending.clone();

    let (addr, context) = start(make_handler(move |mut env: Env| {
        let (deferred, callback) = env.defer()?;
        let mut pending = stash.lock().unwrap();
        pending.callback = Some(callback);
        pending.async_close = Some(env.async_close.clone());
        Ok(deferred.into())
    }))
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(GET).await.unwrap();
    eventually("handler call", || pending.lock().unwrap().callback.is_some()).await;
    drop(stream);

    let async_close = pending.lock().unwrap().async_close.clone().unwrap();
    timeout(Duration::from_secs(5), async_close.wait())
        .await
        .expect("disconnect should fire the close signal");

    let callback = pending.lock().unwrap().callback.take().unwrap();
    eventually("connection teardown", || callback.is_closed()).await;
    assert!(callback.call(Reply::ok("too late")).is_err());
    assert_eq!(context.status.pending_deferred(), 0);
    eventually("connection count", || context.status.active() == 0).await;
}

#[tokio::test]
async fn test_disconnect_aborts_stream_producer() {
    let aborted = Arc::new(AtomicBool::new(false));
    let flag = aborted.clone();

    let (addr, _) = start(make_handler(move |_env| {
        let (sender, body) = Body::channel();
        let flag = flag.clone();
        tokio::spawn(async move {
            loop {
                if sender.send("tick\n").await.is_err() {
                    flag.store(true, Ordering::SeqCst);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });
        Ok(Reply::ok(body).into())
    }))
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(GET).await.unwrap();
    let mut head = [0u8; 64];
    let n = stream.read(&mut head).await.unwrap();
    assert!(n > 0);
    drop(stream);

    eventually("producer abort", || aborted.load(Ordering::SeqCst)).await;
}

/// Handler whose producer sends one chunk and then idles until the body fails.
fn idle_stream_handler(aborted: Arc<AtomicBool>) -> impl Handler {
    make_handler(move |_env| {
        let (sender, body) = Body::channel();
        let flag = aborted.clone();
        tokio::spawn(async move {
            sender.send("first\n").await.unwrap();
            sender.aborted().await;
            flag.store(true, Ordering::SeqCst);
        });
        Ok(Reply::ok(body).into())
    })
}

async fn read_until(stream: &mut (impl AsyncReadExt + Unpin), needle: &str) -> String {
    let mut seen = Vec::new();
    let mut chunk = [0u8; 256];
    while !String::from_utf8_lossy(&seen).contains(needle) {
        let n = timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("response should arrive")
            .unwrap();
        assert!(n > 0, "connection closed before {needle:?}");
        seen.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(seen).unwrap()
}

#[tokio::test]
async fn test_peer_close_fails_idle_stream_over_tcp() {
    let aborted = Arc::new(AtomicBool::new(false));
    let (addr, context) = start(idle_stream_handler(aborted.clone())).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(GET).await.unwrap();
    let seen = read_until(&mut stream, "first\n").await;
    assert!(seen.starts_with("HTTP/1.1 200 OK\r\n"));
    drop(stream);

    eventually("producer abort", || aborted.load(Ordering::SeqCst)).await;
    eventually("connection count", || context.status.active() == 0).await;
}

#[tokio::test]
async fn test_peer_close_ends_connection_task_with_idle_stream() {
    let aborted = Arc::new(AtomicBool::new(false));
    let handler: Arc<dyn Handler> = Arc::new(idle_stream_handler(aborted.clone()));
    let context = ServerContext::default();

    let (mut client, server) = tokio::io::duplex(4096);
    let task = tokio::spawn(serve_connection(server, None, handler, context.clone()));

    client.write_all(GET).await.unwrap();
    read_until(&mut client, "first\n").await;
    drop(client);

    timeout(Duration::from_secs(5), task)
        .await
        .expect("connection task should finish")
        .unwrap()
        .unwrap();
    eventually("producer abort", || aborted.load(Ordering::SeqCst)).await;
    assert_eq!(context.status.active(), 0);
}

#[tokio::test]
async fn test_half_close_still_receives_full_response() {
    const BODY_LEN: usize = 256 * 1024;
    let (addr, _) = start(make_handler(|_env| Ok(Reply::ok(vec![b'x'; BODY_LEN]).into()))).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(GET).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut out = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server should finish writing")
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains(&format!("Content-Length: {BODY_LEN}\r\n")));
    assert_eq!(body.len(), BODY_LEN);
}
