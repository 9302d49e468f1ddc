#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CURRENT_CONFIG_VERSION: u32 = 1;

fn default_config_version() -> u32 {
	CURRENT_CONFIG_VERSION
}

/// Client configuration: endpoints and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	pub config_version: u32,

	/// REST base URL.
	pub api_base_url: String,

	/// Realtime `ws://` / `wss://` endpoint.
	pub socket_url: String,

	pub connect_timeout_secs: u64,

	pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
	fn default() -> Self {
		// Local dev defaults.
		Self {
			config_version: default_config_version(),
			api_base_url: "http://localhost:5000".to_string(),
			socket_url: "ws://localhost:5000".to_string(),
			connect_timeout_secs: 10,
			request_timeout_secs: 30,
		}
	}
}

impl ClientConfig {
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	/// Load from the default location, falling back to defaults.
	pub fn load() -> Self {
		Self::load_from(&config_path()).unwrap_or_default()
	}

	pub fn load_from(path: &Path) -> Option<Self> {
		let data = fs::read_to_string(path).ok()?;
		let v = toml::from_str::<toml::Value>(&data).ok()?;
		let v = migrate_config_toml(v);
		toml::from_str::<ClientConfig>(&v.to_string()).ok()
	}

	/// Persist to the default location. Best-effort.
	pub fn persist(&self) {
		self.persist_to(&config_path());
	}

	pub fn persist_to(&self, path: &Path) {
		if let Some(parent) = path.parent() {
			let _ = fs::create_dir_all(parent);
		}
		if let Ok(data) = toml::to_string_pretty(self) {
			let _ = fs::write(path, data);
		}
	}
}

fn config_dir() -> PathBuf {
	let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
	dir.push("parley");
	dir
}

fn config_path() -> PathBuf {
	let mut p = config_dir();
	p.push("client.toml");
	p
}

fn migrate_config_toml(mut v: toml::Value) -> toml::Value {
	let version = v.get("config_version").and_then(|x| x.as_integer()).unwrap_or(0) as u32;
	if version < CURRENT_CONFIG_VERSION
		&& let Some(table) = v.as_table_mut()
	{
		table.insert(
			"config_version".to_string(),
			toml::Value::Integer(CURRENT_CONFIG_VERSION as i64),
		);
	}
	v
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn roundtrips_through_toml() {
		let td = tempdir().expect("tempdir");
		let path = td.path().join("parley").join("client.toml");

		let cfg = ClientConfig {
			api_base_url: "https://chat.example.com".to_string(),
			socket_url: "wss://chat.example.com".to_string(),
			..Default::default()
		};
		cfg.persist_to(&path);

		let loaded = ClientConfig::load_from(&path).expect("load");
		assert_eq!(loaded.api_base_url, "https://chat.example.com");
		assert_eq!(loaded.socket_url, "wss://chat.example.com");
		assert_eq!(loaded.connect_timeout_secs, 10);
	}

	#[test]
	fn migrate_adds_version_when_missing() {
		let raw = "api_base_url = 'http://x'\n";
		let v = toml::from_str::<toml::Value>(raw).unwrap();
		let v = migrate_config_toml(v);
		assert_eq!(
			v.get("config_version").and_then(|x| x.as_integer()),
			Some(CURRENT_CONFIG_VERSION as i64)
		);
	}

	#[test]
	fn missing_file_falls_back_to_none() {
		let td = tempdir().expect("tempdir");
		assert!(ClientConfig::load_from(&td.path().join("nope.toml")).is_none());
	}
}
