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

use std::io;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the cgroup layer.
///
/// A parameter without a unified-hierarchy mapping is not an error; see
/// [`Translation`](crate::translate::Translation).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// Neither a `cgroup` nor a `cgroup2` filesystem appears in the mount table.
	#[error("could not find a cgroup or cgroup2 mount in {}", table.display())]
	MountNotFound { table: PathBuf },

	#[error("unknown cgroup filesystem type {0:?}")]
	UnsupportedVersion(String),

	/// A controller or group path that cannot be placed under the mount root.
	#[error("invalid cgroup path {input:?}: {reason}")]
	PathResolution { input: String, reason: &'static str },

	/// Legacy hierarchies keep one tree per controller, so a controller is mandatory there.
	#[error("a controller is required for {path:?} on a cgroup v1 hierarchy")]
	MissingController { path: String },

	#[error("control group {} does not exist", .0.display())]
	GroupNotFound(PathBuf),

	#[error("invalid value {value:?} for {key}")]
	InvalidValue { key: String, value: String },

	/// A two-field file such as `cpu.max` did not hold two fields.
	#[error("unexpected content in {}: {content:?}", path.display())]
	MalformedAttribute { path: PathBuf, content: String },

	#[error("invalid owner {0:?}, expected <uid>:<gid>")]
	InvalidOwner(String),

	#[error("{}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// Returns a closure that attaches `path` to an I/O error, for use with `map_err`.
	pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
		move |source| Error::Io {
			path: path.to_path_buf(),
			source,
		}
	}
}
