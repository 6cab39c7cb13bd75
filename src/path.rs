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

//! Mapping of `controller:path` group references onto the mounted hierarchy.

use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;
use crate::error::Result;
use crate::mount::CgroupMount;
use crate::mount::Version;

/// Turns a user-supplied group path into one relative to the hierarchy root.
///
/// A single leading `/` is stripped, so `/a/b` and `a/b` name the same group.
/// Paths that would climb out of the root are rejected.
///
/// # Examples
///
/// ```
/// use cgcompat::normalize;
///
/// assert_eq!(normalize("/a/./b").unwrap().to_str(), Some("a/b"));
/// assert_eq!(normalize("/").unwrap().to_str(), Some(""));
/// assert!(normalize("a/../../etc").is_err());
/// ```
pub fn normalize(input: &str) -> Result<PathBuf> {
	let stripped = input.strip_prefix('/').unwrap_or(input);
	let mut out = PathBuf::new();
	for component in Path::new(stripped).components() {
		match component {
			Component::Normal(part) => out.push(part),
			Component::CurDir => {}
			Component::ParentDir => {
				return Err(Error::PathResolution {
					input: input.to_string(),
					reason: "parent directory references are not allowed",
				})
			}
			Component::RootDir | Component::Prefix(_) => {
				return Err(Error::PathResolution {
					input: input.to_string(),
					reason: "only one leading separator is allowed",
				})
			}
		}
	}
	Ok(out)
}

fn normalize_controller(input: &str) -> Result<Option<String>> {
	let path = normalize(input)?;
	let mut components = path.components();
	match (components.next(), components.next()) {
		(None, _) => Ok(None),
		(Some(Component::Normal(name)), None) => Ok(Some(name.to_string_lossy().into_owned())),
		_ => Err(Error::PathResolution {
			input: input.to_string(),
			reason: "a controller must be a single directory name",
		}),
	}
}

/// A control group named by an optional controller and a path below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupRef {
	controller: Option<String>,
	path: PathBuf,
}

impl GroupRef {
	pub fn new(controller: Option<&str>, path: &str) -> Result<Self> {
		Ok(Self {
			controller: match controller {
				Some(c) => normalize_controller(c)?,
				None => None,
			},
			path: normalize(path)?,
		})
	}

	pub(crate) fn from_parts(controller: Option<String>, path: PathBuf) -> Self {
		Self { controller, path }
	}

	pub fn controller(&self) -> Option<&str> {
		self.controller.as_deref()
	}

	/// The group path, relative to the controller directory (v1) or the root (v2).
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// A copy of this group under a different controller.
	pub fn with_controller(&self, controller: &str) -> Result<Self> {
		Ok(Self {
			controller: normalize_controller(controller)?,
			path: self.path.clone(),
		})
	}

	/// The directory of this group in `mount`.
	///
	/// # Examples
	///
	/// ```
	/// use cgcompat::{CgroupMount, GroupRef, Version};
	///
	/// let group: GroupRef = "cpu:/jobs/a".parse().unwrap();
	/// let v1 = CgroupMount::new("/sys/fs/cgroup", Version::V1);
	/// assert_eq!(group.resolve(&v1).unwrap().to_str(), Some("/sys/fs/cgroup/cpu/jobs/a"));
	/// let v2 = CgroupMount::new("/sys/fs/cgroup", Version::V2);
	/// assert_eq!(group.resolve(&v2).unwrap().to_str(), Some("/sys/fs/cgroup/jobs/a"));
	/// ```
	pub fn resolve(&self, mount: &CgroupMount) -> Result<PathBuf> {
		let mut dir = mount.root().to_path_buf();
		match mount.version() {
			Version::V1 => {
				let Some(controller) = self.controller.as_deref() else {
					return Err(Error::MissingController {
						path: self.path.display().to_string(),
					});
				};
				dir.push(controller);
			}
			Version::V2 => {}
		}
		if !self.path.as_os_str().is_empty() {
			dir.push(&self.path);
		}
		Ok(dir)
	}
}

/// Parses the `controller:path` form used on the command line. A token without
/// `:` is a bare path; an empty controller (`:path`) means none.
impl FromStr for GroupRef {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.split_once(':') {
			Some((controller, path)) => Self::new(Some(controller), path),
			None => Self::new(None, s),
		}
	}
}

/// Formats as `controller:/path`, the form `lscgroup` prints.
impl fmt::Display for GroupRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:/{}", self.controller.as_deref().unwrap_or(""), self.path.display())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_one_separator() {
		assert_eq!(normalize("/a/b").unwrap(), PathBuf::from("a/b"));
		assert_eq!(normalize("a/b/").unwrap(), PathBuf::from("a/b"));
		assert_eq!(normalize("").unwrap(), PathBuf::new());
		assert!(matches!(normalize("//a"), Err(Error::PathResolution { .. })));
	}

	#[test]
	fn rejects_traversal() {
		for input in ["..", "/..", "a/../b", "/a/b/../../.."] {
			assert!(matches!(normalize(input), Err(Error::PathResolution { .. })), "{input}");
		}
	}

	#[test]
	fn parse_group_refs() {
		let group: GroupRef = "/memory:/a/b".parse().unwrap();
		assert_eq!(group.controller(), Some("memory"));
		assert_eq!(group.path(), Path::new("a/b"));

		let group: GroupRef = ":/a".parse().unwrap();
		assert_eq!(group.controller(), None);

		let group: GroupRef = "plain".parse().unwrap();
		assert_eq!(group.controller(), None);
		assert_eq!(group.path(), Path::new("plain"));

		assert!("cpu/x:/a".parse::<GroupRef>().is_err());
		assert!("cpu:../a".parse::<GroupRef>().is_err());
	}

	#[test]
	fn display_round_trips_listing_form() {
		assert_eq!("cpu,cpuacct:a/b".parse::<GroupRef>().unwrap().to_string(), "cpu,cpuacct:/a/b");
		assert_eq!(":/".parse::<GroupRef>().unwrap().to_string(), ":/");
	}

	#[test]
	fn v1_requires_controller() {
		let mount = CgroupMount::new("/cg", Version::V1);
		let group = GroupRef::new(None, "a").unwrap();
		assert!(matches!(group.resolve(&mount), Err(Error::MissingController { .. })));
		let group = group.with_controller("/pids").unwrap();
		assert_eq!(group.resolve(&mount).unwrap(), PathBuf::from("/cg/pids/a"));
	}

	#[test]
	fn v2_ignores_controller() {
		let mount = CgroupMount::new("/cg", Version::V2);
		let group = GroupRef::new(Some("cpu"), "/a").unwrap();
		assert_eq!(group.resolve(&mount).unwrap(), PathBuf::from("/cg/a"));
		let root = GroupRef::new(None, "/").unwrap();
		assert_eq!(root.resolve(&mount).unwrap(), PathBuf::from("/cg"));
	}
}
