use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration, usually loaded from `hotaru.toml`.
///
/// Immutable after loading; the supervisor shares it read-only across tasks.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
	/// Extra directories watched for every watched service.
	#[serde(default)]
	pub watch_dirs: Vec<PathBuf>,
	#[serde(default)]
	pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
	/// Working directory; builds, spawns and cleanups all run here.
	pub chdir: PathBuf,
	pub build: Option<String>,
	pub start: Option<String>,
	/// Split on whitespace into program + args, no shell quoting.
	pub clean: Option<String>,
	pub pack: Option<String>,
	#[serde(default)]
	pub watch: bool,
	#[serde(default)]
	pub watch_dirs: Vec<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config, String> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
	toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

impl Config {
	/// Expand a service selection: an empty list means every configured
	/// service, any unknown name fails the whole call.
	pub fn resolve_names(&self, names: &[String]) -> Result<Vec<String>, String> {
		for name in names {
			if !self.services.contains_key(name) {
				return Err(format!("could not find service {}", name));
			}
		}
		if names.is_empty() {
			Ok(self.services.keys().cloned().collect())
		} else {
			Ok(names.to_vec())
		}
	}
}
