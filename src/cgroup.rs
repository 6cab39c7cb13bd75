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

use std::fs;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::path::PathBuf;

use nix::errno::Errno;
use tracing::debug;
use tracing::warn;

use crate::attr;
use crate::attr::Owner;
use crate::error::Error;
use crate::error::Result;
use crate::mount::CgroupMount;
use crate::mount::Version;
use crate::path::GroupRef;
use crate::translate;
use crate::translate::Translation;

/// Files that describe the group itself rather than a resource setting.
/// Attribute copies and listings skip these along with everything named `cgroup.*`.
pub const MEMBERSHIP_AND_NOTIFY_FILES: &[&str] = &["tasks", "notify_on_release", "release_agent"];

fn is_setting(name: &str) -> bool {
	!MEMBERSHIP_AND_NOTIFY_FILES.contains(&name) && !name.starts_with("cgroup.")
}

/// Ownership and permissions applied by [`GroupManager::create`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
	/// Owner of the group directory.
	pub owner: Option<Owner>,
	/// Owner of the membership files.
	pub task_owner: Option<Owner>,
	/// Mode of the membership files.
	pub task_mode: Option<u32>,
}

/// A named value read from a group. The value is empty when the file is not readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	pub value: String,
}

/// Group operations on one mounted hierarchy.
///
/// Every method takes the group as a [`GroupRef`] and resolves it against the
/// mount given at construction, so v1 and v2 trees are driven through the same
/// calls.
#[derive(Debug, Clone)]
pub struct GroupManager {
	mount: CgroupMount,
}

impl GroupManager {
	pub fn new(mount: CgroupMount) -> Self {
		Self { mount }
	}

	pub fn mount(&self) -> &CgroupMount {
		&self.mount
	}

	pub fn group_dir(&self, group: &GroupRef) -> Result<PathBuf> {
		group.resolve(&self.mount)
	}

	fn membership_files(&self) -> &'static [&'static str] {
		match self.mount.version() {
			Version::V1 => &["tasks", "cgroup.procs"],
			Version::V2 => &["cgroup.procs"],
		}
	}

	/// Creates the group and any missing parents. Existing groups are left in
	/// place, but ownership and modes from `options` are still applied.
	pub fn create(&self, group: &GroupRef, options: &CreateOptions) -> Result<PathBuf> {
		let dir = self.group_dir(group)?;
		DirBuilder::new()
			.recursive(true)
			.mode(0o755)
			.create(&dir)
			.map_err(Error::io(&dir))?;
		debug!(group = %group, dir = %dir.display(), "created");
		if let Some(owner) = options.owner {
			attr::chown(&dir, owner)?;
		}
		for name in self.membership_files() {
			let file = dir.join(name);
			if let Some(owner) = options.task_owner {
				attr::chown(&file, owner)?;
			}
			if let Some(mode) = options.task_mode {
				attr::chmod(&file, mode)?;
			}
		}
		Ok(dir)
	}

	/// Removes the group. Without `recursive` the group must have no subgroups.
	///
	/// The recursive walk removes subgroups depth first and never follows or
	/// removes symbolic links; a group containing one therefore fails to be
	/// removed, but nothing outside the tree is touched.
	pub fn delete(&self, group: &GroupRef, recursive: bool) -> Result<()> {
		let dir = self.group_dir(group)?;
		let is_dir = fs::symlink_metadata(&dir).map(|m| m.is_dir()).unwrap_or(false);
		if !is_dir {
			return Err(Error::GroupNotFound(dir));
		}
		if recursive {
			remove_subgroups(&dir)?;
		}
		fs::remove_dir(&dir).map_err(Error::io(&dir))?;
		debug!(group = %group, "removed");
		Ok(())
	}

	/// Writes `pids` into the group's `tasks` file.
	///
	/// The unified hierarchy has no `tasks` file, so on v2 this fails unless one
	/// exists; [`GroupManager::attach`] is the portable way to move processes.
	pub fn classify(&self, group: &GroupRef, pids: &[u32]) -> Result<()> {
		let dir = self.group_dir(group)?;
		attr::append_pids(&dir.join("tasks"), pids)
	}

	/// Writes `pids` into the group's `cgroup.procs` file.
	pub fn attach(&self, group: &GroupRef, pids: &[u32]) -> Result<()> {
		let dir = self.group_dir(group)?;
		attr::append_pids(&dir.join("cgroup.procs"), pids)
	}

	/// Copies every setting file of `source` into `dest` and returns how many were copied.
	///
	/// On v1 a source without a controller is copied in every controller where
	/// both groups exist.
	pub fn copy_attributes(&self, source: &GroupRef, dest: &GroupRef) -> Result<usize> {
		match (self.mount.version(), source.controller()) {
			(Version::V1, None) => {
				let mut copied = 0;
				for controller in self.list_controllers()? {
					let from = self.group_dir(&source.with_controller(&controller)?)?;
					let to = self.group_dir(&dest.with_controller(&controller)?)?;
					if from.is_dir() && to.is_dir() {
						copied += copy_settings(&from, &to)?;
					}
				}
				Ok(copied)
			}
			(Version::V1, Some(controller)) => {
				let dest = dest.with_controller(controller)?;
				copy_settings(&self.existing_dir(source)?, &self.existing_dir(&dest)?)
			}
			(Version::V2, _) => copy_settings(&self.existing_dir(source)?, &self.existing_dir(dest)?),
		}
	}

	fn existing_dir(&self, group: &GroupRef) -> Result<PathBuf> {
		let dir = self.group_dir(group)?;
		if dir.is_dir() {
			Ok(dir)
		} else {
			Err(Error::GroupNotFound(dir))
		}
	}

	/// Names of the mounted v1 controllers, sorted. Always empty on v2.
	///
	/// Symbolic links such as `cpu -> cpu,cpuacct` are not listed.
	pub fn list_controllers(&self) -> Result<Vec<String>> {
		if self.mount.version() == Version::V2 {
			return Ok(Vec::new());
		}
		subdirectories(self.mount.root())
	}

	/// Every group below the root(s), parents before children.
	pub fn list_groups(&self) -> Result<Vec<GroupRef>> {
		let mut groups = Vec::new();
		match self.mount.version() {
			Version::V1 => {
				for controller in self.list_controllers()? {
					let dir = self.mount.root().join(&controller);
					walk_groups(&dir, &PathBuf::new(), &mut |path| {
						groups.push(GroupRef::from_parts(Some(controller.clone()), path))
					})?;
				}
			}
			Version::V2 => {
				walk_groups(self.mount.root(), &PathBuf::new(), &mut |path| {
					groups.push(GroupRef::from_parts(None, path))
				})?;
			}
		}
		Ok(groups)
	}

	/// Sets parameter `key` in the group.
	///
	/// On v1 the file is written as named; without a controller on `group`,
	/// the controller is the part of `key` before the first `.`. On v2 legacy
	/// names are translated first (see [`translate`]).
	pub fn set(&self, group: &GroupRef, key: &str, value: &str) -> Result<()> {
		check_attribute_name(key)?;
		match self.mount.version() {
			Version::V1 => {
				let dir = match group.controller() {
					Some(_) => self.group_dir(group)?,
					None => {
						let controller = key.split('.').next().unwrap_or(key);
						self.group_dir(&group.with_controller(controller)?)?
					}
				};
				attr::write_all(&dir.join(key), value)
			}
			Version::V2 => {
				let dir = self.group_dir(group)?;
				match translate::write(&dir, key, value)? {
					Translation::Translated(()) | Translation::TargetMissing => Ok(()),
					Translation::Untranslated => attr::write_all(&dir.join(key), value),
				}
			}
		}
	}

	/// Reads the settings of a group, sorted by name.
	///
	/// A non-empty `variables` keeps only those names. On v1 a group without a
	/// controller is read across all controllers. On v2 the group's controller,
	/// if any, restricts the listing to that controller's files, and requested
	/// legacy names are translated and reported first.
	///
	/// Controllers or groups that do not exist yield nothing.
	pub fn get(&self, group: &GroupRef, variables: &[String]) -> Result<Vec<Attribute>> {
		let mut attributes = Vec::new();
		match self.mount.version() {
			Version::V1 => {
				let controllers = match group.controller() {
					Some(controller) => vec![controller.to_string()],
					None => self.list_controllers()?,
				};
				for controller in controllers {
					let dir = self.group_dir(&group.with_controller(&controller)?)?;
					if dir.is_dir() {
						read_settings(&dir, None, variables, &mut attributes)?;
					}
				}
			}
			Version::V2 => {
				let dir = self.group_dir(group)?;
				if !dir.is_dir() {
					return Ok(attributes);
				}
				for key in variables {
					if let Translation::Translated(value) = translate::read(&dir, key)? {
						attributes.push(Attribute {
							name: key.clone(),
							value,
						});
					}
				}
				read_settings(&dir, group.controller(), variables, &mut attributes)?;
			}
		}
		Ok(attributes)
	}
}

fn check_attribute_name(key: &str) -> Result<()> {
	if key.is_empty() || key.contains('/') || key == "." || key == ".." {
		return Err(Error::PathResolution {
			input: key.to_string(),
			reason: "a parameter must be a single file name",
		});
	}
	Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
	let mut entries = fs::read_dir(dir)
		.and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
		.map_err(Error::io(dir))?;
	entries.sort_by_key(|entry| entry.file_name());
	Ok(entries)
}

/// Real subdirectories of `dir`, sorted, without symbolic links.
fn subdirectories(dir: &Path) -> Result<Vec<String>> {
	let mut names = Vec::new();
	for entry in sorted_entries(dir)? {
		let file_type = entry.file_type().map_err(Error::io(&entry.path()))?;
		if file_type.is_dir() {
			names.push(entry.file_name().to_string_lossy().into_owned());
		}
	}
	Ok(names)
}

fn walk_groups(dir: &Path, relative: &Path, visit: &mut dyn FnMut(PathBuf)) -> Result<()> {
	for name in subdirectories(dir)? {
		let child = relative.join(&name);
		visit(child.clone());
		walk_groups(&dir.join(&name), &child, visit)?;
	}
	Ok(())
}

fn remove_subgroups(dir: &Path) -> Result<()> {
	for entry in sorted_entries(dir)? {
		let path = entry.path();
		let file_type = entry.file_type().map_err(Error::io(&path))?;
		if file_type.is_symlink() {
			debug!(path = %path.display(), "not following symlink");
		} else if file_type.is_dir() {
			remove_subgroups(&path)?;
			fs::remove_dir(&path).map_err(Error::io(&path))?;
			debug!(dir = %path.display(), "removed");
		}
	}
	Ok(())
}

fn is_invalid_argument(err: &io::Error) -> bool {
	err.raw_os_error() == Some(Errno::EINVAL as i32)
}

fn copy_settings(from: &Path, to: &Path) -> Result<usize> {
	let mut copied = 0;
	for entry in sorted_entries(from)? {
		let name = entry.file_name();
		let Some(name) = name.to_str() else { continue };
		let source = entry.path();
		if !is_setting(name) || !source.is_file() {
			continue;
		}
		let target = to.join(name);
		let result = fs::read(&source)
			.map_err(|e| (source.clone(), e))
			.and_then(|contents| fs::write(&target, contents).map_err(|e| (target.clone(), e)));
		match result {
			Ok(()) => {
				debug!(from = %source.display(), to = %target.display(), "copied");
				copied += 1;
			}
			Err((path, source)) if is_invalid_argument(&source) => {
				warn!(path = %path.display(), "not copyable, skipping");
			}
			Err((path, source)) => return Err(Error::Io { path, source }),
		}
	}
	Ok(copied)
}

fn read_settings(dir: &Path, controller: Option<&str>, variables: &[String], out: &mut Vec<Attribute>) -> Result<()> {
	let prefix = controller.map(|c| format!("{c}."));
	for entry in sorted_entries(dir)? {
		let name = entry.file_name().to_string_lossy().into_owned();
		let path = entry.path();
		if !is_setting(&name) || !path.is_file() {
			continue;
		}
		if prefix.as_deref().is_some_and(|p| !name.starts_with(p)) {
			continue;
		}
		if !variables.is_empty() && !variables.contains(&name) {
			continue;
		}
		let value = if attr::is_readable(&path)? {
			listed_value(attr::read_bytes(&path))?
		} else {
			String::new()
		};
		out.push(Attribute { name, value });
	}
	Ok(())
}

/// The value shown for a listed file: its content without one trailing
/// newline, or empty when the read was refused.
fn listed_value(content: Result<Vec<u8>>) -> Result<String> {
	match content {
		Ok(content) => {
			let content = String::from_utf8_lossy(&content);
			Ok(content.strip_suffix('\n').unwrap_or(&content).to_string())
		}
		Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::PermissionDenied => Ok(String::new()),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;
	use std::os::unix::fs::symlink;

	use super::*;

	fn v2() -> (tempfile::TempDir, GroupManager) {
		let dir = tempfile::tempdir().unwrap();
		let manager = GroupManager::new(CgroupMount::new(dir.path(), Version::V2));
		(dir, manager)
	}

	fn group(spec: &str) -> GroupRef {
		spec.parse().unwrap()
	}

	#[test]
	fn create_is_idempotent() {
		let (root, manager) = v2();
		let dir = manager.create(&group("/a/b"), &CreateOptions::default()).unwrap();
		assert_eq!(dir, root.path().join("a/b"));
		assert!(dir.is_dir());
		manager.create(&group("a/b"), &CreateOptions::default()).unwrap();
	}

	#[test]
	fn create_applies_task_mode() {
		let (root, manager) = v2();
		fs::create_dir(root.path().join("a")).unwrap();
		fs::write(root.path().join("a/cgroup.procs"), "").unwrap();
		let options = CreateOptions {
			task_mode: Some(0o664),
			..CreateOptions::default()
		};
		manager.create(&group("a"), &options).unwrap();
		let mode = fs::metadata(root.path().join("a/cgroup.procs")).unwrap().permissions();
		assert_eq!(std::os::unix::fs::PermissionsExt::mode(&mode) & 0o777, 0o664);
	}

	#[test]
	fn delete_requires_empty_group() {
		let (root, manager) = v2();
		fs::create_dir_all(root.path().join("a/b")).unwrap();
		assert!(matches!(manager.delete(&group("a"), false), Err(Error::Io { .. })));
		manager.delete(&group("a"), true).unwrap();
		assert!(!root.path().join("a").exists());
		assert!(matches!(manager.delete(&group("a"), false), Err(Error::GroupNotFound(_))));
	}

	#[test]
	fn recursive_delete_skips_symlinks() {
		let (root, manager) = v2();
		let outside = tempfile::tempdir().unwrap();
		fs::create_dir(outside.path().join("precious")).unwrap();
		fs::create_dir_all(root.path().join("g/a/b")).unwrap();
		fs::create_dir_all(root.path().join("g/c")).unwrap();
		symlink(outside.path(), root.path().join("g/link")).unwrap();

		assert!(matches!(manager.delete(&group("g"), true), Err(Error::Io { .. })));
		assert!(!root.path().join("g/a").exists());
		assert!(!root.path().join("g/c").exists());
		assert!(fs::symlink_metadata(root.path().join("g/link")).unwrap().file_type().is_symlink());
		assert!(outside.path().join("precious").is_dir());
	}

	#[test]
	fn list_v2_groups() {
		let (root, manager) = v2();
		fs::create_dir_all(root.path().join("a/b")).unwrap();
		fs::create_dir_all(root.path().join("c")).unwrap();
		fs::write(root.path().join("a/cpu.max"), "max 100000\n").unwrap();
		let listed: BTreeSet<String> = manager.list_groups().unwrap().iter().map(ToString::to_string).collect();
		let expected: BTreeSet<String> = [":/a", ":/a/b", ":/c"].into_iter().map(String::from).collect();
		assert_eq!(listed, expected);
		assert!(manager.list_controllers().unwrap().is_empty());
	}

	#[test]
	fn copy_skips_membership_files() {
		let (root, manager) = v2();
		for name in ["src", "dst"] {
			fs::create_dir(root.path().join(name)).unwrap();
		}
		fs::write(root.path().join("src/cpu.max"), "50000 100000\n").unwrap();
		fs::write(root.path().join("src/memory.high"), "1048576\n").unwrap();
		fs::write(root.path().join("src/cgroup.procs"), "42\n").unwrap();
		fs::write(root.path().join("src/tasks"), "42\n").unwrap();
		fs::create_dir(root.path().join("src/child")).unwrap();
		fs::write(root.path().join("dst/cgroup.procs"), "7\n").unwrap();
		fs::write(root.path().join("dst/memory.high"), "max\n").unwrap();

		assert_eq!(manager.copy_attributes(&group("src"), &group("/dst")).unwrap(), 2);
		let read = |name: &str| fs::read_to_string(root.path().join("dst").join(name)).unwrap();
		assert_eq!(read("cpu.max"), "50000 100000\n");
		assert_eq!(read("memory.high"), "1048576\n");
		assert_eq!(read("cgroup.procs"), "7\n");
		assert!(!root.path().join("dst/tasks").exists());
		assert!(!root.path().join("dst/child").exists());
	}

	#[test]
	fn copy_needs_both_groups() {
		let (root, manager) = v2();
		fs::create_dir(root.path().join("src")).unwrap();
		assert!(matches!(
			manager.copy_attributes(&group("src"), &group("missing")),
			Err(Error::GroupNotFound(_))
		));
	}

	#[test]
	fn set_translates_on_v2() {
		let (root, manager) = v2();
		fs::create_dir(root.path().join("a")).unwrap();
		fs::write(root.path().join("a/cpu.max"), "50000 100000\n").unwrap();
		manager.set(&group("a"), "cpu.cfs_period_us", "200000").unwrap();
		manager.set(&group("a"), "pids.max", "10").unwrap();
		manager.set(&group("a"), "cpu.shares", "512").unwrap();
		assert_eq!(fs::read_to_string(root.path().join("a/cpu.max")).unwrap(), "50000 200000\n");
		assert_eq!(fs::read_to_string(root.path().join("a/pids.max")).unwrap(), "10");
		assert!(!root.path().join("a/cpu.weight").exists());
		assert!(!root.path().join("a/cpu.shares").exists());
		assert!(matches!(manager.set(&group("a"), "../escape", "1"), Err(Error::PathResolution { .. })));
	}

	#[test]
	fn refused_reads_list_as_empty() {
		let refused = Err(Error::Io {
			path: PathBuf::from("memory.stat"),
			source: io::Error::from(io::ErrorKind::PermissionDenied),
		});
		assert_eq!(listed_value(refused).unwrap(), "");
		assert_eq!(listed_value(Ok(b"1 2\n3\n\n".to_vec())).unwrap(), "1 2\n3\n");

		let missing = Err(Error::Io {
			path: PathBuf::from("memory.stat"),
			source: io::Error::from(io::ErrorKind::NotFound),
		});
		assert!(matches!(listed_value(missing), Err(Error::Io { .. })));
	}

	#[test]
	fn only_einval_is_skipped_during_copy() {
		assert!(is_invalid_argument(&io::Error::from_raw_os_error(Errno::EINVAL as i32)));
		assert!(!is_invalid_argument(&io::Error::from_raw_os_error(Errno::EACCES as i32)));
		assert!(!is_invalid_argument(&io::Error::from(io::ErrorKind::InvalidInput)));
	}

	#[test]
	fn get_masks_unreadable_files() {
		let (root, manager) = v2();
		fs::create_dir(root.path().join("a")).unwrap();
		fs::write(root.path().join("a/memory.max"), "max\n").unwrap();
		fs::write(root.path().join("a/memory.reclaim"), "").unwrap();
		fs::write(root.path().join("a/cpu.weight"), "100\n").unwrap();
		fs::write(root.path().join("a/cgroup.type"), "domain\n").unwrap();
		attr::chmod(&root.path().join("a/memory.reclaim"), 0o200).unwrap();

		let attributes = manager.get(&group("memory:a"), &[]).unwrap();
		let pairs: Vec<(&str, &str)> = attributes.iter().map(|a| (a.name.as_str(), a.value.as_str())).collect();
		assert_eq!(pairs, [("memory.max", "max"), ("memory.reclaim", "")]);

		let variables = vec!["memory.limit_in_bytes".to_string(), "cpu.weight".to_string()];
		let attributes = manager.get(&group("a"), &variables).unwrap();
		let pairs: Vec<(&str, &str)> = attributes.iter().map(|a| (a.name.as_str(), a.value.as_str())).collect();
		assert_eq!(pairs, [("memory.limit_in_bytes", "9223372036854771712"), ("cpu.weight", "100")]);
	}
}
