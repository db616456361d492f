//! Minimal blocking HTTP/1.1 transport.
//!
//! One request per connection: read the head until CRLFCRLF, honour
//! `Content-Length` for a body, answer, close. Connections are handed to a
//! fixed worker pool so `/info` stays answerable while a move holds one
//! worker. Move and park requests queue on the motion guard, so a long park
//! can occupy every worker; once the hand-off queue is full new connections
//! get 503 instead of stalling the accept loop.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use magloop_core::DynDispatcher;
use magloop_core::status::Reply;

use crate::routes;

/// Request head plus body may not exceed this.
pub const MAX_REQUEST_SIZE: usize = 4096;

const ACCEPT_IDLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Query-string arguments in order of appearance.
    pub args: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("connection closed before a request arrived")]
    Closed,
    #[error("request exceeds {MAX_REQUEST_SIZE} bytes")]
    TooLarge,
    #[error("{0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// `application/x-www-form-urlencoded` decoding; invalid escapes pass through.
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(h), Some(l)) => {
                        out.push((h << 4) | l);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (url_decode(k), url_decode(v)),
            None => (url_decode(pair), String::new()),
        })
        .collect()
}

/// Read one request from `stream`.
pub fn read_request(stream: &mut impl Read) -> Result<Request, RequestError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() >= MAX_REQUEST_SIZE {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return if buf.is_empty() {
                Err(RequestError::Closed)
            } else {
                Err(RequestError::Malformed("truncated request head"))
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..head_end])
        .map_err(|_| RequestError::Malformed("request head is not valid UTF-8"))?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("");
    if method.is_empty() || target.is_empty() {
        return Err(RequestError::Malformed("bad request line"));
    }
    let (path, args) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query(q)),
        None => (target.to_string(), Vec::new()),
    };

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| RequestError::Malformed("bad Content-Length"))?;
            }
        }
    }
    if content_length > MAX_REQUEST_SIZE.saturating_sub(head_end) {
        return Err(RequestError::TooLarge);
    }

    let mut body = buf.split_off(head_end);
    while body.len() < content_length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(RequestError::Malformed("truncated request body"));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Request {
        method,
        path,
        args,
        body,
    })
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

pub fn write_reply(stream: &mut impl Write, reply: &Reply) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.code,
        reason(reply.code),
        reply.content_type,
        reply.body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(reply.body.as_bytes())?;
    stream.flush()
}

fn handle_connection(mut stream: TcpStream, dispatcher: &DynDispatcher, read_timeout: Duration) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    if let Err(e) = stream.set_read_timeout(Some(read_timeout)) {
        tracing::warn!(%peer, error = %e, "set read timeout");
    }
    let reply = match read_request(&mut stream) {
        Ok(req) => {
            tracing::debug!(%peer, method = %req.method, path = %req.path, "request");
            routes::route(dispatcher, &req)
        }
        Err(RequestError::Closed) => return,
        Err(e @ RequestError::TooLarge) => Reply::new(413, magloop_core::status::TEXT, e.to_string()),
        Err(RequestError::Io(e)) => {
            tracing::debug!(%peer, error = %e, "read failed");
            return;
        }
        Err(e) => Reply::new(400, magloop_core::status::TEXT, e.to_string()),
    };
    if let Err(e) = write_reply(&mut stream, &reply) {
        tracing::debug!(%peer, error = %e, "write failed");
    }
}

/// Queue a connection for the workers; answer 503 when they are all busy.
/// Returns false once the workers are gone.
fn hand_off(tx: &xch::Sender<TcpStream>, stream: TcpStream) -> bool {
    match tx.try_send(stream) {
        Ok(()) => true,
        Err(xch::TrySendError::Full(mut stream)) => {
            tracing::warn!("all http workers busy, refusing connection");
            let reply = Reply::new(503, magloop_core::status::TEXT, "Busy, try again later");
            if let Err(e) = write_reply(&mut stream, &reply) {
                tracing::debug!(error = %e, "write failed");
            }
            true
        }
        Err(xch::TrySendError::Disconnected(_)) => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerOpts {
    pub workers: usize,
    pub read_timeout: Duration,
}

/// Accept connections until `shutdown` is set, then drain the workers.
pub fn serve(
    listener: TcpListener,
    dispatcher: Arc<DynDispatcher>,
    opts: ServerOpts,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    listener
        .set_nonblocking(true)
        .wrap_err("set listener non-blocking")?;
    let (tx, rx) = xch::bounded::<TcpStream>(opts.workers * 4);

    let mut handles = Vec::with_capacity(opts.workers);
    for i in 0..opts.workers {
        let rx = rx.clone();
        let dispatcher = dispatcher.clone();
        let handle = std::thread::Builder::new()
            .name(format!("http-{i}"))
            .spawn(move || {
                for stream in rx.iter() {
                    handle_connection(stream, &dispatcher, opts.read_timeout);
                }
            })
            .wrap_err("spawn http worker")?;
        handles.push(handle);
    }
    drop(rx);

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                // Workers expect blocking sockets.
                if let Err(e) = stream.set_nonblocking(false) {
                    tracing::warn!(error = %e, "set stream blocking");
                    continue;
                }
                if !hand_off(&tx, stream) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_IDLE),
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    }

    drop(tx);
    for h in handles {
        let _ = h.join();
    }
    Ok(())
}
