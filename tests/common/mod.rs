#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;

use waypoint::http::request::Request;
use waypoint::http::{RequestContext, ResponseHandle};
use waypoint::routing::Router;
use waypoint::server::{Server, ServerOptions};

/// A response as seen by a client.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn parse_response(bytes: &[u8]) -> RawResponse {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let (head, body) = text
        .split_once("\r\n\r\n")
        .expect("response has a header block");
    let mut lines = head.split("\r\n");
    let status_line = lines.next().expect("status line");
    let status = status_line
        .split(' ')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("numeric status");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    RawResponse {
        status,
        headers,
        body: body.to_string(),
    }
}

/// A context whose response lands in the returned stream.
pub fn context_for(request: Request) -> (RequestContext, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (RequestContext::new(request, ResponseHandle::new(server)), client)
}

/// Reads everything written to the client side of a duplex pair.
pub async fn read_all(mut client: DuplexStream) -> RawResponse {
    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();
    parse_response(&bytes)
}

pub async fn start_server(router: Router) -> (Server, SocketAddr) {
    start_server_with(router, ServerOptions::default()).await
}

pub async fn start_server_with(router: Router, options: ServerOptions) -> (Server, SocketAddr) {
    let mut server = Server::new(["http://127.0.0.1:0/"], router)
        .unwrap()
        .with_options(options);
    server.start().await.unwrap();
    let addr = server.local_addrs()[0];
    (server, addr)
}

pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    parse_response(&bytes)
}

pub async fn request(addr: SocketAddr, method: &str, target: &str, body: &str) -> RawResponse {
    let raw = format!(
        "{method} {target} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    send_raw(addr, raw.as_bytes()).await
}

pub async fn get(addr: SocketAddr, target: &str) -> RawResponse {
    request(addr, "GET", target, "").await
}
