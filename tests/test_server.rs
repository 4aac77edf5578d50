mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::Notify;

use waypoint::http::{RequestContext, StatusCode};
use waypoint::routing::Router;
use waypoint::server::{Prefix, Server, ServerError, ServerOptions, ServerState};

use common::{get, request, send_raw, start_server, start_server_with};

async fn show_product(ctx: RequestContext) -> anyhow::Result<()> {
    let body = format!(
        r#"{{"id":"{}","verbose":{}}}"#,
        ctx.route_param("id").unwrap_or_default(),
        ctx.query_param("verbose") == Some("true"),
    );
    ctx.write_json(StatusCode::Ok, body).await?;
    Ok(())
}

async fn home(ctx: RequestContext) -> anyhow::Result<()> {
    ctx.write_html(StatusCode::Ok, "<h1>home</h1>").await?;
    Ok(())
}

async fn submit(mut ctx: RequestContext) -> anyhow::Result<()> {
    let body = ctx.read_body()?;
    ctx.write_html(StatusCode::Created, format!("got {body}")).await?;
    Ok(())
}

async fn failing(_ctx: RequestContext) -> anyhow::Result<()> {
    anyhow::bail!("database offline")
}

async fn exploding(_ctx: RequestContext) -> anyhow::Result<()> {
    panic!("inventory exploded");
}

async fn silent(_ctx: RequestContext) -> anyhow::Result<()> {
    Ok(())
}

async fn write_then_fail(ctx: RequestContext) -> anyhow::Result<()> {
    ctx.write_html(StatusCode::Ok, "partial success").await?;
    anyhow::bail!("cleanup failed")
}

async fn slow(ctx: RequestContext) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(400)).await;
    ctx.write_html(StatusCode::Ok, "slow").await?;
    Ok(())
}

fn app() -> Router {
    let mut router = Router::new();
    router.get("/", home).unwrap();
    router.post("/submit", submit).unwrap();
    router.get("/products/{id}", show_product).unwrap();
    router.get("/fail", failing).unwrap();
    router.get("/panic", exploding).unwrap();
    router.get("/silent", silent).unwrap();
    router.get("/partial", write_then_fail).unwrap();
    router.get("/slow", slow).unwrap();
    router
}

#[tokio::test]
async fn test_route_with_params_and_query() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/products/42?verbose=true").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Type"), Some("application/json; charset=utf-8"));
    assert_eq!(response.body, r#"{"id":"42","verbose":true}"#);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_route_and_method_get_404() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/missing").await;
    assert_eq!(response.status, 404);
    assert!(response.header("Content-Type").unwrap().starts_with("text/html"));

    let response = request(addr, "DELETE", "/submit", "").await;
    assert_eq!(response.status, 404);

    server.stop().await;
}

#[tokio::test]
async fn test_post_body_reaches_handler() {
    let (mut server, addr) = start_server(app()).await;

    let response = request(addr, "POST", "/submit", "name=lamp").await;
    assert_eq!(response.status, 201);
    assert_eq!(response.body, "got name=lamp");

    server.stop().await;
}

#[tokio::test]
async fn test_handler_error_becomes_500_and_server_keeps_serving() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/fail").await;
    assert_eq!(response.status, 500);
    assert!(response.body.contains("500 Internal Server Error"));
    assert!(!response.body.contains("database offline"));

    let response = get(addr, "/").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<h1>home</h1>");

    server.stop().await;
}

#[tokio::test]
async fn test_handler_panic_becomes_500() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/panic").await;
    assert_eq!(response.status, 500);
    assert!(!response.body.contains("inventory exploded"));

    assert_eq!(get(addr, "/").await.status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_error_details_exposed_when_enabled() {
    let options = ServerOptions {
        expose_error_details: true,
        ..ServerOptions::default()
    };
    let (mut server, addr) = start_server_with(app(), options).await;

    assert!(get(addr, "/fail").await.body.contains("database offline"));
    assert!(get(addr, "/panic").await.body.contains("inventory exploded"));

    server.stop().await;
}

#[tokio::test]
async fn test_error_after_write_keeps_original_response() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/partial").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "partial success");

    server.stop().await;
}

#[tokio::test]
async fn test_handler_without_response_gets_500() {
    let (mut server, addr) = start_server(app()).await;

    let response = get(addr, "/silent").await;
    assert_eq!(response.status, 500);
    assert!(response.body.contains("500 Internal Server Error"));

    server.stop().await;
}

#[tokio::test]
async fn test_slow_handlers_run_concurrently() {
    let (mut server, addr) = start_server(app()).await;

    let started = Instant::now();
    let (a, b) = tokio::join!(get(addr, "/slow"), get(addr, "/slow"));
    assert_eq!(a.body, "slow");
    assert_eq!(b.body, "slow");
    assert!(started.elapsed() < Duration::from_millis(750));

    server.stop().await;
}

#[tokio::test]
async fn test_blocked_handler_does_not_hold_up_others() {
    let release = Arc::new(Notify::new());
    let mut router = Router::new();
    let gate = Arc::clone(&release);
    router
        .get("/wait", move |ctx: RequestContext| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                ctx.write_html(StatusCode::Ok, "released").await?;
                Ok::<(), anyhow::Error>(())
            }
        })
        .unwrap();
    router.get("/", home).unwrap();
    let (mut server, addr) = start_server(router).await;

    let waiting = tokio::spawn(async move { get(addr, "/wait").await });

    let fast = get(addr, "/").await;
    assert_eq!(fast.status, 200);
    assert!(!waiting.is_finished());

    release.notify_one();
    assert_eq!(waiting.await.unwrap().body, "released");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_request_gets_400() {
    let (mut server, addr) = start_server(app()).await;

    let response = send_raw(addr, b"NONSENSE\r\n\r\n").await;
    assert_eq!(response.status, 400);

    let response = send_raw(addr, b"GET / SPDY/3\r\n\r\n").await;
    assert_eq!(response.status, 400);

    server.stop().await;
}

#[tokio::test]
async fn test_chunked_body_gets_501() {
    let (mut server, addr) = start_server(app()).await;

    let response = send_raw(
        addr,
        b"POST /submit HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n",
    )
    .await;
    assert_eq!(response.status, 501);

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_request_gets_413() {
    let options = ServerOptions {
        max_request_bytes: 64,
        ..ServerOptions::default()
    };
    let (mut server, addr) = start_server_with(app(), options).await;

    let raw = format!(
        "POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 500\r\n\r\n{}",
        "x".repeat(40)
    );
    let response = send_raw(addr, raw.as_bytes()).await;
    assert_eq!(response.status, 413);

    server.stop().await;
}

#[tokio::test]
async fn test_declared_length_over_limit_gets_413_without_waiting() {
    let options = ServerOptions {
        max_request_bytes: 1024,
        read_timeout: Duration::from_secs(5),
        ..ServerOptions::default()
    };
    let (mut server, addr) = start_server_with(app(), options).await;

    let started = Instant::now();
    let response = send_raw(
        addr,
        b"POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10000000\r\n\r\n",
    )
    .await;
    assert_eq!(response.status, 413);
    assert!(started.elapsed() < Duration::from_secs(2));

    server.stop().await;
}

#[tokio::test]
async fn test_incomplete_request_times_out_with_408() {
    let options = ServerOptions {
        read_timeout: Duration::from_millis(200),
        ..ServerOptions::default()
    };
    let (mut server, addr) = start_server_with(app(), options).await;

    let response = send_raw(addr, b"GET / HTTP/1.1\r\nHost: loc").await;
    assert_eq!(response.status, 408);

    server.stop().await;
}

#[tokio::test]
async fn test_lifecycle_states() {
    let mut server = Server::new(["http://127.0.0.1:0/"], app()).unwrap();
    assert_eq!(server.state(), ServerState::Created);
    assert!(server.local_addrs().is_empty());

    server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Started);
    assert!(matches!(
        server.start().await,
        Err(ServerError::AlreadyStarted)
    ));

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(matches!(server.start().await, Err(ServerError::Stopped)));

    // Stopping twice is harmless.
    server.stop().await;
}

#[tokio::test]
async fn test_stopped_server_refuses_connections() {
    let (mut server, addr) = start_server(app()).await;
    assert_eq!(get(addr, "/").await.status, 200);

    server.stop().await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_multiple_prefixes_all_serve() {
    let mut server =
        Server::new(["http://127.0.0.1:0/", "http://localhost:0/"], app()).unwrap();
    server.start().await.unwrap();

    let addrs = server.local_addrs().to_vec();
    assert_eq!(addrs.len(), 2);
    for addr in addrs {
        assert_eq!(get(addr, "/").await.status, 200);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let (mut first, addr) = start_server(app()).await;

    let prefix = format!("http://127.0.0.1:{}/", addr.port());
    let mut second = Server::new([prefix], app()).unwrap();
    assert!(matches!(
        second.start().await,
        Err(ServerError::Bind { .. })
    ));
    assert_eq!(second.state(), ServerState::Created);

    first.stop().await;
}

#[test]
fn test_server_requires_a_prefix() {
    assert!(matches!(
        Server::new(Vec::<String>::new(), Router::new()),
        Err(ServerError::NoPrefixes)
    ));
}

#[test]
fn test_https_prefix_is_rejected() {
    assert!(matches!(
        Server::new(["https://127.0.0.1:8443/"], Router::new()),
        Err(ServerError::UnsupportedScheme(_))
    ));
}

#[test]
fn test_prefix_parsing() {
    let prefix = Prefix::parse("http://+:8080/").unwrap();
    assert_eq!(prefix.host(), "0.0.0.0");
    assert_eq!(prefix.port(), 8080);
    assert_eq!(prefix.bind_addr(), "0.0.0.0:8080");
    assert_eq!(prefix.to_string(), "http://+:8080/");

    let prefix = Prefix::parse("http://localhost/").unwrap();
    assert_eq!(prefix.port(), 80);

    assert!(matches!(
        Prefix::parse("http://localhost:8080/api/"),
        Err(ServerError::InvalidPrefix { .. })
    ));
    assert!(matches!(
        Prefix::parse("localhost:8080"),
        Err(ServerError::InvalidPrefix { .. })
    ));
}
