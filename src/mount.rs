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

//! Discovery of the mounted cgroup hierarchy.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;

use tracing::debug;

use crate::error::Error;
use crate::error::Result;

pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Which kernel interface a [`CgroupMount`] exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
	/// Legacy interface: one mounted tree per controller.
	V1,
	/// Unified interface (cgroup2): a single tree.
	V2,
}

impl Version {
	/// The filesystem type this interface appears as in the mount table.
	pub fn fstype(self) -> &'static str {
		match self {
			Version::V1 => "cgroup",
			Version::V2 => "cgroup2",
		}
	}
}

impl FromStr for Version {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		[Version::V1, Version::V2]
			.into_iter()
			.find(|version| version.fstype() == s)
			.ok_or_else(|| Error::UnsupportedVersion(s.to_string()))
	}
}

/// The root of the active cgroup hierarchy and its interface version.
///
/// Under [`Version::V1`] the root is the directory holding one mount point per
/// controller (typically `/sys/fs/cgroup`); under [`Version::V2`] it is the
/// cgroup2 mount point itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupMount {
	root: PathBuf,
	version: Version,
}

impl CgroupMount {
	pub fn new(root: impl Into<PathBuf>, version: Version) -> Self {
		Self {
			root: root.into(),
			version,
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn version(&self) -> Version {
		self.version
	}

	/// Resolves the hierarchy from `/proc/mounts` once and caches it for the
	/// rest of the process.
	pub fn system() -> Result<&'static CgroupMount> {
		static SYSTEM: OnceLock<CgroupMount> = OnceLock::new();
		static SCAN: Mutex<()> = Mutex::new(());
		init_once(&SYSTEM, &SCAN, || Self::from_mount_file(PROC_MOUNTS))
	}

	pub fn from_mount_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let table = fs::read_to_string(path).map_err(Error::io(path))?;
		Self::from_mount_table(&table).ok_or_else(|| Error::MountNotFound {
			table: path.to_path_buf(),
		})
	}

	/// Scans a mount table in `/proc/mounts` format.
	///
	/// A legacy `cgroup` entry anywhere in the table wins over any `cgroup2`
	/// entry; within one type the first entry wins.
	///
	/// # Examples
	///
	/// ```
	/// use cgcompat::{CgroupMount, Version};
	///
	/// let table = "cgroup2 /sys/fs/cgroup/unified cgroup2 rw 0 0\n\
	///              cgroup /sys/fs/cgroup/cpu cgroup rw,cpu 0 0\n";
	/// let mount = CgroupMount::from_mount_table(table).unwrap();
	/// assert_eq!(mount.version(), Version::V1);
	/// assert_eq!(mount.root().to_str(), Some("/sys/fs/cgroup"));
	/// ```
	pub fn from_mount_table(table: &str) -> Option<Self> {
		let entries: Vec<(String, Version)> = table
			.lines()
			.filter_map(|line| {
				let mut fields = line.split_whitespace();
				let mountpoint = fields.nth(1)?;
				let version = fields.next()?.parse::<Version>().ok()?;
				Some((unescape_mountpoint(mountpoint), version))
			})
			.collect();

		if let Some((mountpoint, _)) = entries.iter().find(|(_, v)| *v == Version::V1) {
			let mountpoint = Path::new(mountpoint);
			let root = mountpoint.parent().unwrap_or(mountpoint);
			debug!(root = %root.display(), "found cgroup v1 hierarchy");
			return Some(Self::new(root, Version::V1));
		}
		let (mountpoint, _) = entries.iter().find(|(_, v)| *v == Version::V2)?;
		debug!(root = %mountpoint, "found cgroup v2 hierarchy");
		Some(Self::new(mountpoint, Version::V2))
	}
}

/// Fills `cell` with the result of `init`, running `init` at most once even
/// with concurrent first callers. A failed `init` leaves the cell empty.
fn init_once<'a, T>(cell: &'a OnceLock<T>, lock: &Mutex<()>, init: impl FnOnce() -> Result<T>) -> Result<&'a T> {
	if let Some(value) = cell.get() {
		return Ok(value);
	}
	let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
	if let Some(value) = cell.get() {
		return Ok(value);
	}
	let value = init()?;
	Ok(cell.get_or_init(|| value))
}

/// Decodes the `\NNN` octal escapes the kernel uses for whitespace in mount points.
fn unescape_mountpoint(raw: &str) -> String {
	let bytes = raw.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
			let code = bytes[i + 1..i + 4].iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
			if let Ok(byte) = u8::try_from(code) {
				out.push(byte);
				i += 4;
				continue;
			}
		}
		out.push(bytes[i]);
		i += 1;
	}
	String::from_utf8_lossy(&out).into_owned()
}
