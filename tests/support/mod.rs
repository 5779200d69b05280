//! Raw-TCP fault injection for exercising transport retry behavior.
//!
//! httpmock can only answer with well-formed HTTP; the retry policy cares
//! about connections that die before any response exists, so this helper
//! speaks TCP directly: it works through a scripted sequence of actions,
//! one per incoming connection, counting every attempt and recording the
//! request path of each connection it actually answers.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Debug)]
pub enum FaultAction {
    /// Accept the connection and drop it without sending a single byte;
    /// the client sees a reset / premature close (a network-level failure).
    CloseWithoutResponse,
    /// Read the full request, then answer with the given status and body.
    Respond { status: u16, body: String },
}

impl FaultAction {
    pub fn ok(body: &str) -> Self {
        FaultAction::Respond {
            status: 200,
            body: body.to_string(),
        }
    }
}

pub struct FaultServer {
    addr: SocketAddr,
    attempts: Arc<AtomicUsize>,
    answered_paths: Arc<Mutex<Vec<String>>>,
}

impl FaultServer {
    /// Start a server that works through `sequence` one connection at a
    /// time; connections beyond the end of the sequence are dropped
    /// unanswered (and still counted).
    pub fn start(sequence: Vec<FaultAction>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fault server");
        let addr = listener.local_addr().expect("fault server addr");
        let attempts = Arc::new(AtomicUsize::new(0));
        let answered_paths = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&attempts);
        let paths = Arc::clone(&answered_paths);
        thread::spawn(move || {
            let mut actions = sequence.into_iter();
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);

                match actions.next() {
                    Some(FaultAction::Respond { status, body }) => {
                        let path = consume_request(&mut stream);
                        if let Some(path) = path {
                            paths.lock().unwrap().push(path);
                        }
                        let reason = if status == 200 { "OK" } else { "ERROR" };
                        let response = format!(
                            "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(response.as_bytes());
                        let _ = stream.flush();
                    }
                    Some(FaultAction::CloseWithoutResponse) | None => {
                        drop(stream);
                    }
                }
            }
        });

        Self {
            addr,
            attempts,
            answered_paths,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Total connections seen, including ones dropped unanswered.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Request paths of the connections that were answered, in order.
    pub fn answered_paths(&self) -> Vec<String> {
        self.answered_paths.lock().unwrap().clone()
    }
}

/// Read the request line, headers, and the declared body length so the
/// client never sees a reset while still sending. Returns the request path.
fn consume_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) => return None,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                    break pos + 4;
                }
            }
            Err(_) => return None,
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head
        .lines()
        .next()
        .and_then(|request_line| request_line.split_whitespace().nth(1))
        .map(|p| p.to_string());

    let content_length = head
        .lines()
        .find_map(|line| {
            let lower = line.to_lowercase();
            lower.strip_prefix("content-length:").map(|v| v.to_string())
        })
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - header_end);
    while remaining > 0 {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => remaining = remaining.saturating_sub(n),
            Err(_) => break,
        }
    }

    path
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
