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

//! This package implements the cgroup-tools commands (`cgexec`, `cgset`, `cgget`, `cgcreate`, `cgdelete`, `cgclassify`, `lssubsys`, `lscgroup`) on top of either the legacy cgroup v1 hierarchy or the unified cgroup v2 hierarchy.
//!
//! Callers use the v1 parameter names on both. On the unified hierarchy, parameters whose name or encoding changed, such as `cpu.shares` becoming `cpu.weight`, are translated in both directions; see [`translate`].
//!
//! The library entry points are:
//!
//! - [`CgroupMount`] finds which hierarchy is mounted and where.
//! - [`GroupRef`] names a group as `controller:path`.
//! - [`GroupManager`] creates, removes, populates, copies, reads and lists groups.
//!
//! ```no_run
//! use cgcompat::{CgroupMount, GroupManager, GroupRef};
//!
//! let manager = GroupManager::new(CgroupMount::system()?.clone());
//! let group: GroupRef = "cpu:/batch".parse()?;
//! manager.create(&group, &Default::default())?;
//! manager.set(&group, "cpu.shares", "512")?;
//! # Ok::<(), cgcompat::Error>(())
//! ```

mod attr;
mod cgroup;
mod error;
mod mount;
mod path;
pub mod translate;

#[doc(hidden)]
pub mod internal;

pub use attr::Owner;
pub use cgroup::Attribute;
pub use cgroup::CreateOptions;
pub use cgroup::GroupManager;
pub use cgroup::MEMBERSHIP_AND_NOTIFY_FILES;
pub use error::Error;
pub use error::Result;
pub use mount::CgroupMount;
pub use mount::Version;
pub use mount::PROC_MOUNTS;
pub use path::normalize;
pub use path::GroupRef;
