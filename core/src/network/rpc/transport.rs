use serde_json::Value;
use std::{path::PathBuf, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::{Error, Request};

const READ_CHUNK_SIZE: usize = 4096;

/// Upstream connection used by the [`super::Client`].
///
/// HTTP keeps a pooled `reqwest` client; IPC opens a fresh local socket
/// (Unix domain socket or Windows named pipe) for every call, so no connection
/// state is shared between calls.
#[derive(Clone, Debug)]
pub enum Transport {
	Http(Http),
	Ipc(Ipc),
}

impl Transport {
	pub fn is_http(endpoint: &str) -> bool {
		let endpoint = endpoint.trim().to_ascii_lowercase();
		endpoint.starts_with("http://") || endpoint.starts_with("https://")
	}

	pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, Error> {
		let endpoint = endpoint.trim();
		if endpoint.is_empty() {
			return Err(Error::InvalidEndpoint("empty address".to_string()));
		}

		if Self::is_http(endpoint) {
			Http::new(endpoint, timeout).map(Transport::Http)
		} else {
			Ok(Transport::Ipc(Ipc {
				path: PathBuf::from(endpoint),
				timeout,
			}))
		}
	}

	pub async fn send(&self, request: &Request) -> Result<Value, Error> {
		trace!(method = %request.method, id = request.id, "Sending request");
		match self {
			Transport::Http(http) => http.send(request).await,
			Transport::Ipc(ipc) => ipc.send(request).await,
		}
	}
}

#[derive(Clone, Debug)]
pub struct Http {
	client: reqwest::Client,
	url: String,
}

impl Http {
	fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|error| Error::InvalidEndpoint(format!("{url}: {error}")))?;

		Ok(Http {
			client,
			url: url.to_string(),
		})
	}

	async fn send(&self, request: &Request) -> Result<Value, Error> {
		let response = self
			.client
			.post(&self.url)
			.json(request)
			.send()
			.await
			.map_err(|error| Error::Transport(format!("Cannot reach {}: {error}", self.url)))?;

		// Nodes answer JSON-RPC errors with non-2xx codes too, so the body decides
		response
			.json::<Value>()
			.await
			.map_err(|error| Error::InvalidResponse(error.to_string()))
	}
}

#[derive(Clone, Debug)]
pub struct Ipc {
	path: PathBuf,
	timeout: Duration,
}

impl Ipc {
	async fn send(&self, request: &Request) -> Result<Value, Error> {
		let path = self.path.display().to_string();
		let payload =
			serde_json::to_vec(request).map_err(|error| Error::Transport(error.to_string()))?;

		let call = async {
			let stream = connect(&self.path)
				.await
				.map_err(|error| Error::Transport(format!("Cannot connect to {path}: {error}")))?;
			exchange(stream, &payload).await
		};

		tokio::time::timeout(self.timeout, call)
			.await
			.map_err(|_| Error::Transport(format!("Request to {path} timed out")))?
	}
}

#[cfg(unix)]
async fn connect(path: &std::path::Path) -> std::io::Result<tokio::net::UnixStream> {
	tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn connect(
	path: &std::path::Path,
) -> std::io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
	tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}

/// Writes one request and reads until a complete JSON value arrives.
async fn exchange<S>(mut stream: S, payload: &[u8]) -> Result<Value, Error>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	stream
		.write_all(payload)
		.await
		.map_err(|error| Error::Transport(error.to_string()))?;
	stream
		.flush()
		.await
		.map_err(|error| Error::Transport(error.to_string()))?;

	let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
	let mut chunk = [0u8; READ_CHUNK_SIZE];
	let mut scanner = Scanner::default();
	loop {
		let read = stream
			.read(&mut chunk)
			.await
			.map_err(|error| Error::Transport(error.to_string()))?;

		if read == 0 {
			if buffer.is_empty() {
				return Err(Error::Transport("Connection closed by node".to_string()));
			}
			return first_value(&buffer);
		}

		buffer.extend_from_slice(&chunk[..read]);
		if scanner.feed(&chunk[..read]) {
			return first_value(&buffer);
		}
	}
}

fn first_value(buffer: &[u8]) -> Result<Value, Error> {
	serde_json::Deserializer::from_slice(buffer)
		.into_iter::<Value>()
		.next()
		.unwrap_or_else(|| Err(serde::de::Error::custom("empty response")))
		.map_err(|error| Error::InvalidResponse(error.to_string()))
}

/// Tracks nesting across reads, each byte is looked at once.
#[derive(Debug, Default)]
struct Scanner {
	depth: usize,
	started: bool,
	in_string: bool,
	escaped: bool,
}

impl Scanner {
	/// Returns `true` once the first top-level object or array is closed.
	fn feed(&mut self, bytes: &[u8]) -> bool {
		for &byte in bytes {
			if self.in_string {
				match byte {
					_ if self.escaped => self.escaped = false,
					b'\\' => self.escaped = true,
					b'"' => self.in_string = false,
					_ => {},
				}
				continue;
			}

			match byte {
				b'"' => self.in_string = true,
				b'{' | b'[' => {
					self.depth += 1;
					self.started = true;
				},
				b'}' | b']' if self.started => {
					self.depth = self.depth.saturating_sub(1);
					if self.depth == 0 {
						return true;
					}
				},
				_ => {},
			}
		}
		false
	}
}
