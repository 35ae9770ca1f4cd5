use std::time::Duration;

/// Identity used to key admission counters, usually the remote IP address.
pub type ClientIdentity = String;

pub const UNKNOWN_CLIENT: &str = "unknown";

pub fn client_identity(remote: Option<std::net::SocketAddr>) -> ClientIdentity {
	remote
		.map(|address| address.ip().to_string())
		.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub mod duration_millis_format {
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}
