use crate::app::config::RuntimeConfig;
use crate::app::error::ServeError;
use crate::app::routes;
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_HEAD_BYTES: u64 = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
            Status::ServiceUnavailable => 503,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: String,
    /// Request target without query or fragment, still percent-encoded.
    pub path: String,
    pub peer: IpAddr,
}

#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            content_type,
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new("text/html; charset=utf-8", body)
    }

    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self::new("text/plain; charset=UTF-8", body)
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::new("application/json", body)
    }

    pub fn error(err: &ServeError) -> Self {
        Self {
            status: err.status(),
            content_type: "text/plain; charset=utf-8",
            body: format!("{}\n", err).into_bytes(),
        }
    }
}

/// Binds the configured address and serves until accepting fails.
pub fn serve(config: RuntimeConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    let local_addr = listener.local_addr().unwrap_or(config.listen);
    log::info!(
        "Server is running on http://{} ({} projects)",
        local_addr,
        config.registry.len()
    );
    serve_on(listener, Arc::new(config))
}

/// Accept loop; each connection is answered on its own thread.
pub fn serve_on(listener: TcpListener, config: Arc<RuntimeConfig>) -> Result<()> {
    let slots = Arc::new(ConnectionSlots::new(MAX_CONNECTIONS));
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let Some(slot) = ConnectionSlots::try_acquire(&slots) else {
                    log::warn!("Refusing {}: {} connections active", peer, slots.limit);
                    refuse(&stream);
                    continue;
                };
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, peer, &config) {
                        log::debug!("Connection from {} ended with error: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("Failed to accept connection"),
        }
    }
}

/// Bounds the number of connection threads alive at once.
struct ConnectionSlots {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionSlots {
    fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    fn try_acquire(slots: &Arc<Self>) -> Option<SlotGuard> {
        let mut current = slots.active.load(Ordering::Acquire);
        loop {
            if current >= slots.limit {
                return None;
            }
            match slots.active.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(SlotGuard(Arc::clone(slots))),
                Err(updated) => current = updated,
            }
        }
    }
}

/// Releases its slot when the connection thread finishes.
struct SlotGuard(Arc<ConnectionSlots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Answers 503 without reading the request.
fn refuse(stream: &TcpStream) {
    let mut writer = stream;
    if let Err(err) = write_response(&mut writer, &Response::error(&ServeError::Busy), false) {
        log::debug!("Failed to refuse connection: {}", err);
    }
}

fn handle_connection(stream: TcpStream, peer: SocketAddr, config: &RuntimeConfig) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = BufReader::new(&stream);

    let (request, response) = match read_request(&mut reader, peer.ip())? {
        Ok(request) => {
            let response = routes::dispatch(&request, config);
            (Some(request), response)
        }
        Err(err) => (None, Response::error(&err)),
    };

    let head_only = request.as_ref().is_some_and(|r| r.method == "HEAD");
    match &request {
        Some(request) => log::info!(
            "{} {} from {} -> {}",
            request.method,
            request.path,
            peer,
            response.status.code()
        ),
        None => log::warn!("Malformed request from {}", peer),
    }

    let mut writer = &stream;
    write_response(&mut writer, &response, head_only)
}

/// Reads the request line and skips the headers. The outer error is a
/// transport failure; the inner one a request we refuse to parse.
fn read_request<R: BufRead>(reader: &mut R, peer: IpAddr) -> io::Result<Result<Request, ServeError>> {
    let mut head = reader.take(MAX_HEAD_BYTES);

    let mut request_line = String::new();
    if head.read_line(&mut request_line)? == 0 {
        return Ok(Err(ServeError::MalformedRequest));
    }

    loop {
        let mut header = String::new();
        let read = head.read_line(&mut header)?;
        if read == 0 || header.trim_end().is_empty() {
            if read == 0 && head.limit() == 0 {
                return Ok(Err(ServeError::MalformedRequest));
            }
            break;
        }
    }

    Ok(parse_request_line(&request_line, peer))
}

fn parse_request_line(line: &str, peer: IpAddr) -> Result<Request, ServeError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ServeError::MalformedRequest);
    };
    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return Err(ServeError::MalformedRequest);
    }

    let path = target.split(['?', '#']).next().unwrap_or_default();
    Ok(Request {
        method: method.to_string(),
        path: path.to_string(),
        peer,
    })
}

fn write_response<W: Write>(writer: &mut W, response: &Response, head_only: bool) -> io::Result<()> {
    let status = response.status;
    write!(
        writer,
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-Content-Type-Options: nosniff\r\nConnection: close\r\n\r\n",
        status.code(),
        status.reason(),
        response.content_type,
        response.body.len()
    )?;
    if !head_only {
        writer.write_all(&response.body)?;
    }
    writer.flush()
}

/// Decodes `%XX` escapes in a request path component.
pub fn percent_decode(input: &str) -> Result<String, ServeError> {
    if !input.contains('%') {
        return Ok(input.to_string());
    }

    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hi = bytes.get(index + 1).copied().and_then(hex_value);
            let lo = bytes.get(index + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    decoded.push((hi << 4) | lo);
                    index += 3;
                    continue;
                }
                _ => return Err(ServeError::InvalidPath),
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }

    String::from_utf8(decoded).map_err(|_| ServeError::InvalidPath)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
