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

//! Single-file reads and writes on the cgroup filesystem.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::str::FromStr;

use nix::unistd::Gid;
use nix::unistd::Group;
use nix::unistd::Uid;
use nix::unistd::User;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
	fs::read(path).map_err(Error::io(path))
}

pub fn read_string(path: &Path) -> Result<String> {
	fs::read_to_string(path).map_err(Error::io(path))
}

/// Replaces the whole content of `path`; the file ends up exactly `contents` long.
pub fn write_all(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
	let contents = contents.as_ref();
	debug!(path = %path.display(), value = %String::from_utf8_lossy(contents).trim_end(), "write");
	fs::write(path, contents).map_err(Error::io(path))
}

/// Appends one PID per `write(2)`, as membership files accept a single PID per write.
pub fn append_pids(path: &Path, pids: &[u32]) -> Result<()> {
	let mut file = OpenOptions::new().append(true).create(true).open(path).map_err(Error::io(path))?;
	for pid in pids {
		debug!(path = %path.display(), pid, "attach");
		file.write_all(format!("{pid}\n").as_bytes()).map_err(Error::io(path))?;
	}
	Ok(())
}

/// Whether the owner read bit is set. Listing skips the read instead of
/// failing on write-only control files.
pub fn is_readable(path: &Path) -> Result<bool> {
	let metadata = fs::metadata(path).map_err(Error::io(path))?;
	Ok(metadata.permissions().mode() & 0o400 != 0)
}

fn fields(path: &Path) -> Result<(String, Vec<String>)> {
	let content = read_string(path)?;
	let fields: Vec<String> = content.split_whitespace().map(str::to_string).collect();
	if fields.len() != 2 {
		return Err(Error::MalformedAttribute {
			path: path.to_path_buf(),
			content,
		});
	}
	Ok((content, fields))
}

/// Reads field `index` of a two-field file such as `cpu.max`.
pub fn read_field(path: &Path, index: usize) -> Result<String> {
	let (_, mut fields) = fields(path)?;
	Ok(fields.swap_remove(index))
}

/// Replaces field `index` of a two-field file, keeping the other field as it
/// currently reads.
pub fn write_field(path: &Path, index: usize, value: &str) -> Result<()> {
	let (_, mut fields) = fields(path)?;
	fields[index] = value.to_string();
	write_all(path, format!("{}\n", fields.join(" ")))
}

/// An owner specifier in `uid:gid` form. Each side may be numeric, a name, or
/// empty to leave it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
	pub uid: Option<Uid>,
	pub gid: Option<Gid>,
}

impl FromStr for Owner {
	type Err = Error;

	/// # Examples
	///
	/// ```
	/// use cgcompat::Owner;
	///
	/// let owner: Owner = "1000:".parse().unwrap();
	/// assert_eq!(owner.uid.map(|u| u.as_raw()), Some(1000));
	/// assert_eq!(owner.gid, None);
	/// assert!("no-such-user-here:0".parse::<Owner>().is_err());
	/// ```
	fn from_str(s: &str) -> Result<Self> {
		let invalid = || Error::InvalidOwner(s.to_string());
		let (user, group) = s.split_once(':').unwrap_or((s, ""));
		let uid = match user {
			"" => None,
			name => Some(match name.parse::<u32>() {
				Ok(raw) => Uid::from_raw(raw),
				Err(_) => User::from_name(name).ok().flatten().ok_or_else(invalid)?.uid,
			}),
		};
		let gid = match group {
			"" => None,
			name => Some(match name.parse::<u32>() {
				Ok(raw) => Gid::from_raw(raw),
				Err(_) => Group::from_name(name).ok().flatten().ok_or_else(invalid)?.gid,
			}),
		};
		Ok(Self { uid, gid })
	}
}

pub fn chown(path: &Path, owner: Owner) -> Result<()> {
	debug!(path = %path.display(), ?owner, "chown");
	nix::unistd::chown(path, owner.uid, owner.gid).map_err(|errno| Error::Io {
		path: path.to_path_buf(),
		source: errno.into(),
	})
}

pub fn chmod(path: &Path, mode: u32) -> Result<()> {
	debug!(path = %path.display(), mode = format_args!("{mode:o}"), "chmod");
	fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(Error::io(path))
}
