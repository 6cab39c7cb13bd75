// Copyright 2026 Octave Online LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-level glue shared by the command-line applets.

use std::env;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::mount::CgroupMount;
use crate::GroupManager;

pub const LOG_ENV: &str = "CGCOMPAT_LOG";
pub const MOUNTS_ENV: &str = "CGCOMPAT_MOUNTS";

pub fn os_check() {
	if !cfg!(target_os = "linux") {
		eprintln!("Warning: control groups are only available on Linux");
	}
}

/// Settings taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
	/// Mount table to scan instead of `/proc/mounts`.
	pub mounts: Option<PathBuf>,
	pub log_filter: Option<String>,
}

impl Config {
	pub fn from_env() -> Self {
		Self::from_vars(|name| env::var(name).ok())
	}

	pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
		let non_empty = |name: &str| var(name).filter(|v: &String| !v.is_empty());
		Self {
			mounts: non_empty(MOUNTS_ENV).map(PathBuf::from),
			log_filter: non_empty(LOG_ENV),
		}
	}

	pub fn manager(&self) -> Result<GroupManager> {
		let mount = match &self.mounts {
			Some(table) => CgroupMount::from_mount_file(table)?,
			None => CgroupMount::system()?.clone(),
		};
		Ok(GroupManager::new(mount))
	}
}

/// Sends `tracing` output to stderr, filtered by [`LOG_ENV`] (default `warn`).
pub fn init_logging(config: &Config) {
	let filter = config
		.log_filter
		.as_deref()
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.unwrap_or_else(|| EnvFilter::new("warn"));
	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(false)
				.with_writer(std::io::stderr),
		)
		.try_init();
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;
	use crate::Version;

	#[test]
	fn config_from_vars() {
		let config = Config::from_vars(|name| match name {
			MOUNTS_ENV => Some("/tmp/mounts".to_string()),
			LOG_ENV => Some(String::new()),
			_ => None,
		});
		assert_eq!(config.mounts, Some(PathBuf::from("/tmp/mounts")));
		assert_eq!(config.log_filter, None);
	}

	#[test]
	fn manager_from_mount_override() {
		let dir = tempfile::tempdir().unwrap();
		let table = dir.path().join("mounts");
		fs::write(&table, format!("cgroup2 {} cgroup2 rw 0 0\n", dir.path().display())).unwrap();
		let config = Config {
			mounts: Some(table),
			log_filter: None,
		};
		let manager = config.manager().unwrap();
		assert_eq!(manager.mount().version(), Version::V2);
		assert_eq!(manager.mount().root(), dir.path());
	}
}
