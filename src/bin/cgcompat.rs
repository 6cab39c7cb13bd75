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

use cgcompat::internal;
use cgcompat::internal::Config;
use cgcompat::Attribute;
use cgcompat::CreateOptions;
use cgcompat::GroupManager;
use cgcompat::GroupRef;
use cgcompat::Owner;
use cgcompat::Version;
use clap::Args;
use clap::Parser;
use std::env;
use std::ffi::OsString;
use std::io;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process;
use std::process::Command;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
	#[error(transparent)]
	Cgroup(#[from] cgcompat::Error),
	#[error("failed to write output: {0}")]
	Output(#[from] io::Error),
	#[error("failed to execute {cmd:?}: {source}")]
	Exec { cmd: OsString, source: io::Error },
}

/// The commands this binary answers to, either through a symlink of that name
/// or as the first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applet {
	Cgexec,
	Cgset,
	Cgget,
	Cgcreate,
	Cgdelete,
	Cgclassify,
	Lssubsys,
	Lscgroup,
}

impl Applet {
	const ALL: [Applet; 8] = [
		Applet::Cgexec,
		Applet::Cgset,
		Applet::Cgget,
		Applet::Cgcreate,
		Applet::Cgdelete,
		Applet::Cgclassify,
		Applet::Lssubsys,
		Applet::Lscgroup,
	];

	fn name(self) -> &'static str {
		match self {
			Applet::Cgexec => "cgexec",
			Applet::Cgset => "cgset",
			Applet::Cgget => "cgget",
			Applet::Cgcreate => "cgcreate",
			Applet::Cgdelete => "cgdelete",
			Applet::Cgclassify => "cgclassify",
			Applet::Lssubsys => "lssubsys",
			Applet::Lscgroup => "lscgroup",
		}
	}

	fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|applet| applet.name() == name)
	}

	fn run(self, args: Vec<OsString>, config: &Config) -> Result<(), CliError> {
		let mut out = io::stdout().lock();
		match self {
			Applet::Cgexec => CgexecCli::parse_from(args).run(&config.manager()?),
			Applet::Cgset => CgsetCli::parse_from(args).run(&config.manager()?),
			Applet::Cgget => CggetCli::parse_from(args).run(&config.manager()?, &mut out),
			Applet::Cgcreate => CgcreateCli::parse_from(args).run(&config.manager()?),
			Applet::Cgdelete => CgdeleteCli::parse_from(args).run(&config.manager()?),
			Applet::Cgclassify => CgclassifyCli::parse_from(args).run(&config.manager()?),
			Applet::Lssubsys => LssubsysCli::parse_from(args).run(&config.manager()?, &mut out),
			Applet::Lscgroup => LscgroupCli::parse_from(args).run(&config.manager()?, &mut out),
		}
	}
}

#[derive(Debug, PartialEq)]
enum Invocation {
	Applet(Applet, Vec<OsString>),
	List,
	Install,
	Usage,
	Unknown(String),
}

/// Picks the applet from the program name (`cgget`, `cgget.exe`) or, when run
/// under its own name, from the first argument.
fn dispatch(mut argv: Vec<OsString>) -> Invocation {
	let program = argv
		.first()
		.and_then(|arg0| Path::new(arg0).file_name())
		.map(|name| name.to_string_lossy().split('.').next().unwrap_or_default().to_string())
		.unwrap_or_default();
	if let Some(applet) = Applet::from_name(&program) {
		return Invocation::Applet(applet, argv);
	}
	if !argv.is_empty() {
		argv.remove(0);
	}
	let Some(first) = argv.first() else {
		return Invocation::Usage;
	};
	let first = first.to_string_lossy().into_owned();
	match first.as_str() {
		"--list" => Invocation::List,
		"--install" => Invocation::Install,
		name => match Applet::from_name(name) {
			Some(applet) => Invocation::Applet(applet, argv),
			None => Invocation::Unknown(name.to_string()),
		},
	}
}

/// Creates one symlink per applet in the current directory, pointing at this executable.
fn install() -> io::Result<()> {
	let exe = env::current_exe()?;
	for applet in Applet::ALL {
		std::os::unix::fs::symlink(&exe, applet.name())?;
	}
	Ok(())
}

fn parse_group_path(input: &str) -> Result<GroupRef, cgcompat::Error> {
	GroupRef::new(None, input)
}

fn parse_key_value(input: &str) -> Result<(String, String), &'static str> {
	let (key, value) = input.split_once('=').ok_or("expected name=value")?;
	if !key.chars().all(|c| matches!(c, '_' | '.' | '-' | 'a'..='z' | 'A'..='Z' | '0'..='9')) {
		return Err("name contains invalid characters");
	}
	if !key.contains('.') {
		return Err("name must be of the form CONTROLLER.PARAMETER");
	}
	Ok((key.to_string(), value.to_string()))
}

fn parse_mode(input: &str) -> Result<u32, String> {
	u32::from_str_radix(input, 8)
		.ok()
		.filter(|mode| *mode <= 0o7777)
		.ok_or_else(|| format!("{input:?} is not an octal file mode"))
}

#[derive(Parser, Debug)]
#[command(name = "cgexec", version, about = "Runs a program in the given control groups")]
struct CgexecCli {
	/// Control group to join, as <controllers>:<path>. May be repeated.
	#[arg(short = 'g', value_name = "CONTROLLERS:PATH")]
	groups: Vec<GroupRef>,

	/// The command to run, followed by its arguments.
	#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
	cmd: Vec<OsString>,
}

impl CgexecCli {
	/// Joins the groups and replaces this process with the command; only returns on failure.
	fn run(self, manager: &GroupManager) -> Result<(), CliError> {
		let pid = process::id();
		for group in &self.groups {
			manager.attach(group, &[pid])?;
		}
		let source = Command::new(&self.cmd[0]).args(&self.cmd[1..]).exec();
		Err(CliError::Exec {
			cmd: self.cmd[0].clone(),
			source,
		})
	}
}

#[derive(Args, Debug)]
#[group(required = true, multiple = true)]
struct Settings {
	/// Parameter to set, as name=value, such as "cpu.shares=512". May be repeated.
	#[arg(short = 'r', long = "variable", value_name = "NAME=VALUE", value_parser = parse_key_value)]
	variables: Vec<(String, String)>,

	/// Control group whose parameters are copied.
	#[arg(long, value_name = "SOURCE_CGROUP_PATH", value_parser = parse_group_path)]
	copy_from: Option<GroupRef>,
}

#[derive(Parser, Debug)]
#[command(name = "cgset", version, about = "Sets parameters of control groups")]
struct CgsetCli {
	#[command(flatten)]
	settings: Settings,

	/// Control groups to modify.
	#[arg(required = true, value_parser = parse_group_path)]
	paths: Vec<GroupRef>,
}

impl CgsetCli {
	fn run(self, manager: &GroupManager) -> Result<(), CliError> {
		for path in &self.paths {
			if let Some(source) = &self.settings.copy_from {
				manager.copy_attributes(source, path)?;
			}
			for (key, value) in &self.settings.variables {
				manager.set(path, key, value)?;
			}
		}
		Ok(())
	}
}

/// A group together with the path as it was typed, which cgget echoes in headers.
#[derive(Debug, Clone, PartialEq)]
struct NamedGroup {
	typed: String,
	group: GroupRef,
}

fn parse_named_group(input: &str) -> Result<NamedGroup, cgcompat::Error> {
	Ok(NamedGroup {
		typed: input.to_string(),
		group: GroupRef::new(None, input)?,
	})
}

/// A `-g` argument of cgget: a controller filter or a full group.
#[derive(Debug, Clone, PartialEq)]
enum GetTarget {
	Controller(String),
	Group(NamedGroup),
}

fn parse_get_target(input: &str) -> Result<GetTarget, cgcompat::Error> {
	if let Some((_, path)) = input.split_once(':') {
		return Ok(GetTarget::Group(NamedGroup {
			typed: path.to_string(),
			group: input.parse()?,
		}));
	}
	let group = GroupRef::new(Some(input), "")?;
	Ok(match group.controller() {
		Some(controller) => GetTarget::Controller(controller.to_string()),
		None => GetTarget::Group(NamedGroup {
			typed: String::new(),
			group,
		}),
	})
}

#[derive(Parser, Debug)]
#[command(name = "cgget", version, about = "Prints parameters of control groups")]
struct CggetCli {
	/// Controller to read, or a group as <controller>:<path>. May be repeated.
	#[arg(short = 'g', value_name = "CONTROLLER[:PATH]", value_parser = parse_get_target)]
	targets: Vec<GetTarget>,

	/// Parameter to display. May be repeated.
	#[arg(short = 'r', long = "variable", value_name = "NAME")]
	variables: Vec<String>,

	/// Do not print group headers.
	#[arg(short = 'n')]
	no_headers: bool,

	/// Print only values, not parameter names.
	#[arg(short = 'v', long)]
	values_only: bool,

	/// Control groups to read.
	#[arg(value_parser = parse_named_group)]
	paths: Vec<NamedGroup>,
}

impl CggetCli {
	fn run(self, manager: &GroupManager, out: &mut impl Write) -> Result<(), CliError> {
		let controllers: Vec<&str> = self
			.targets
			.iter()
			.filter_map(|target| match target {
				GetTarget::Controller(controller) => Some(controller.as_str()),
				GetTarget::Group(_) => None,
			})
			.collect();
		for NamedGroup { typed, group: path } in &self.paths {
			self.header(out, typed)?;
			if manager.mount().version() == Version::V1 && !controllers.is_empty() {
				for controller in &controllers {
					self.print(out, &manager.get(&path.with_controller(controller)?, &self.variables)?)?;
				}
			} else {
				self.print(out, &manager.get(path, &self.variables)?)?;
			}
		}
		for target in &self.targets {
			if let GetTarget::Group(NamedGroup { typed, group }) = target {
				self.header(out, typed)?;
				self.print(out, &manager.get(group, &self.variables)?)?;
			}
		}
		Ok(())
	}

	fn header(&self, out: &mut impl Write, typed: &str) -> io::Result<()> {
		if self.no_headers {
			return Ok(());
		}
		writeln!(out, "{typed}:")
	}

	fn print(&self, out: &mut impl Write, attributes: &[Attribute]) -> io::Result<()> {
		for attribute in attributes {
			if self.values_only {
				writeln!(out, "{}", attribute.value)?;
			} else {
				writeln!(out, "{}: {}", attribute.name, attribute.value)?;
			}
		}
		Ok(())
	}
}

#[derive(Parser, Debug)]
#[command(name = "cgcreate", version, about = "Creates control groups")]
struct CgcreateCli {
	/// Control group to create, as <controllers>:<path>. May be repeated.
	#[arg(short = 'g', required = true, value_name = "CONTROLLERS:PATH")]
	groups: Vec<GroupRef>,

	/// Owner of the group directory.
	#[arg(short = 'a', value_name = "UID:GID")]
	owner: Option<Owner>,

	/// Owner of the task membership files.
	#[arg(short = 't', value_name = "UID:GID")]
	task_owner: Option<Owner>,

	/// Octal permissions of the task membership files.
	#[arg(short = 's', long = "tperm", value_name = "MODE", value_parser = parse_mode)]
	task_mode: Option<u32>,
}

impl CgcreateCli {
	fn run(self, manager: &GroupManager) -> Result<(), CliError> {
		let options = CreateOptions {
			owner: self.owner,
			task_owner: self.task_owner,
			task_mode: self.task_mode,
		};
		for group in &self.groups {
			manager.create(group, &options)?;
		}
		Ok(())
	}
}

#[derive(Parser, Debug)]
#[command(name = "cgdelete", version, about = "Removes control groups")]
struct CgdeleteCli {
	/// Control group to remove, as <controllers>:<path>. May be repeated.
	#[arg(short = 'g', required = true, value_name = "CONTROLLERS:PATH")]
	groups: Vec<GroupRef>,

	/// Recursively remove all subgroups.
	#[arg(short = 'r', long)]
	recursive: bool,
}

impl CgdeleteCli {
	fn run(self, manager: &GroupManager) -> Result<(), CliError> {
		for group in &self.groups {
			manager.delete(group, self.recursive)?;
		}
		Ok(())
	}
}

#[derive(Parser, Debug)]
#[command(name = "cgclassify", version, about = "Moves running processes to control groups")]
struct CgclassifyCli {
	/// Control group to move the processes to, as <controllers>:<path>. May be repeated.
	#[arg(short = 'g', required = true, value_name = "CONTROLLERS:PATH")]
	groups: Vec<GroupRef>,

	/// Process IDs to move.
	#[arg(required = true)]
	pids: Vec<u32>,
}

impl CgclassifyCli {
	fn run(self, manager: &GroupManager) -> Result<(), CliError> {
		for group in &self.groups {
			manager.classify(group, &self.pids)?;
		}
		Ok(())
	}
}

#[derive(Parser, Debug)]
#[command(name = "lssubsys", version, about = "Lists mounted cgroup v1 controllers")]
struct LssubsysCli {}

impl LssubsysCli {
	fn run(self, manager: &GroupManager, out: &mut impl Write) -> Result<(), CliError> {
		for controller in manager.list_controllers()? {
			writeln!(out, "{controller}")?;
		}
		Ok(())
	}
}

#[derive(Parser, Debug)]
#[command(name = "lscgroup", version, about = "Lists all control groups")]
struct LscgroupCli {}

impl LscgroupCli {
	fn run(self, manager: &GroupManager, out: &mut impl Write) -> Result<(), CliError> {
		for group in manager.list_groups()? {
			writeln!(out, "{group}")?;
		}
		Ok(())
	}
}

fn main() -> ExitCode {
	let config = Config::from_env();
	internal::init_logging(&config);
	internal::os_check();
	let (applet, args) = match dispatch(env::args_os().collect()) {
		Invocation::Applet(applet, args) => (applet, args),
		Invocation::List => {
			for applet in Applet::ALL {
				println!("{}", applet.name());
			}
			return ExitCode::SUCCESS;
		}
		Invocation::Install => {
			if let Err(e) = install() {
				eprintln!("failed to install applet links: {e}");
				return ExitCode::FAILURE;
			}
			return ExitCode::SUCCESS;
		}
		Invocation::Usage => {
			eprintln!("cgcompat - cgroup-tools for both cgroup v1 and v2 (cgroup2)");
			eprintln!("usage: cgcompat <applet> [args...]; use --list to show available applets, --install to link them here.");
			return ExitCode::FAILURE;
		}
		Invocation::Unknown(name) => {
			eprintln!("{name} applet is not available");
			return ExitCode::FAILURE;
		}
	};
	match applet.run(args, &config) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{}: {e}", applet.name());
			ExitCode::FAILURE
		}
	}
}

#[cfg(test)]
fn args(input: &str) -> Vec<OsString> {
	shlex::split(input).unwrap().into_iter().map(OsString::from).collect()
}

#[cfg(test)]
fn v2_tree() -> (tempfile::TempDir, GroupManager) {
	let dir = tempfile::tempdir().unwrap();
	let manager = GroupManager::new(cgcompat::CgroupMount::new(dir.path(), Version::V2));
	(dir, manager)
}

#[test]
fn test_dispatch() {
	assert_eq!(dispatch(args("/usr/bin/cgget -n a")), Invocation::Applet(Applet::Cgget, args("/usr/bin/cgget -n a")));
	assert_eq!(dispatch(args("lscgroup.py")), Invocation::Applet(Applet::Lscgroup, args("lscgroup.py")));
	assert_eq!(dispatch(args("cgcompat cgset -r a.b=1 g")), Invocation::Applet(Applet::Cgset, args("cgset -r a.b=1 g")));
	assert_eq!(dispatch(args("cgcompat --list")), Invocation::List);
	assert_eq!(dispatch(args("./cgcompat --install")), Invocation::Install);
	assert_eq!(dispatch(args("cgcompat")), Invocation::Usage);
	assert_eq!(dispatch(Vec::new()), Invocation::Usage);
	assert_eq!(dispatch(args("cgcompat cgsnapshot")), Invocation::Unknown("cgsnapshot".to_string()));
}

#[test]
fn test_cli_cgexec() {
	fn cli(input: &str) -> Result<CgexecCli, String> {
		CgexecCli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
	}
	assert!(cli("cgexec").is_err());
	assert!(cli("cgexec -g cpu:/a").is_err());
	assert!(cli("cgexec -g cpu:../a sleep 1").is_err());
	let parsed = cli("cgexec -g cpu:/a -g memory:/a ls -l --color").unwrap();
	assert_eq!(parsed.groups, vec!["cpu:a".parse::<GroupRef>().unwrap(), "memory:a".parse::<GroupRef>().unwrap()]);
	assert_eq!(parsed.cmd, args("ls -l --color"));
	let parsed = cli("cgexec ls -g cpu:/a").unwrap();
	assert!(parsed.groups.is_empty());
	assert_eq!(parsed.cmd, args("ls -g cpu:/a"));
}

#[test]
fn test_cli_cgset() {
	fn cli(input: &str) -> Result<CgsetCli, String> {
		CgsetCli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
	}
	assert!(cli("cgset grp").is_err());
	assert!(cli("cgset -r cpu.shares=512").is_err());
	assert!(cli("cgset -r shares=512 grp").is_err());
	assert!(cli("cgset -r cpu.shares grp").is_err());
	let parsed = cli("cgset -r cpu.shares=512 --variable hugetlb.2MB.limit_in_bytes=0 /a b").unwrap();
	assert_eq!(
		parsed.settings.variables,
		vec![
			("cpu.shares".to_string(), "512".to_string()),
			("hugetlb.2MB.limit_in_bytes".to_string(), "0".to_string()),
		]
	);
	assert_eq!(parsed.paths, vec![GroupRef::new(None, "a").unwrap(), GroupRef::new(None, "b").unwrap()]);
	let parsed = cli("cgset --copy-from /src dst").unwrap();
	assert_eq!(parsed.settings.copy_from, Some(GroupRef::new(None, "src").unwrap()));
	assert!(parsed.settings.variables.is_empty());
}

#[test]
fn test_cli_cgget() {
	fn cli(input: &str) -> Result<CggetCli, String> {
		CggetCli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
	}
	let parsed = cli("cgget -n -v -g cpu -g memory:/a -r cpu.shares b").unwrap();
	assert!(parsed.no_headers && parsed.values_only);
	assert_eq!(
		parsed.targets,
		vec![
			GetTarget::Controller("cpu".to_string()),
			GetTarget::Group(NamedGroup {
				typed: "/a".to_string(),
				group: "memory:/a".parse().unwrap(),
			}),
		]
	);
	assert_eq!(parsed.variables, vec!["cpu.shares".to_string()]);
	assert_eq!(parsed.paths[0].typed, "b");
	assert_eq!(parsed.paths[0].group, GroupRef::new(None, "/b").unwrap());
	assert!(cli("cgget -g cpu/x").is_err());
}

#[test]
fn test_cli_cgcreate() {
	fn cli(input: &str) -> Result<CgcreateCli, String> {
		CgcreateCli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
	}
	assert!(cli("cgcreate").is_err());
	assert!(cli("cgcreate -g cpu:/a -s 999").is_err());
	let parsed = cli("cgcreate -g cpu:/a -a 1000:1000 -t 1000: --tperm 0664").unwrap();
	assert_eq!(parsed.task_mode, Some(0o664));
	assert_eq!(parsed.owner.and_then(|o| o.gid).map(|g| g.as_raw()), Some(1000));
	assert_eq!(parsed.task_owner.and_then(|o| o.gid), None);
}

#[test]
fn test_cli_cgclassify() {
	fn cli(input: &str) -> Result<CgclassifyCli, String> {
		CgclassifyCli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
	}
	assert!(cli("cgclassify -g cpu:/a").is_err());
	assert!(cli("cgclassify -g cpu:/a pid").is_err());
	assert_eq!(cli("cgclassify -g cpu:/a 123 456").unwrap().pids, vec![123, 456]);
	assert!(CgdeleteCli::try_parse_from(args("cgdelete -r")).is_err());
	assert!(CgdeleteCli::try_parse_from(args("cgdelete -r -g :/a")).unwrap().recursive);
}

#[test]
fn test_cgget_output() {
	let (root, manager) = v2_tree();
	std::fs::create_dir(root.path().join("a")).unwrap();
	std::fs::write(root.path().join("a/cpu.max"), "max 100000\n").unwrap();
	std::fs::write(root.path().join("a/cpu.weight"), "100\n").unwrap();
	std::fs::write(root.path().join("a/memory.max"), "max\n").unwrap();
	std::fs::write(root.path().join("a/cgroup.procs"), "1\n").unwrap();

	let mut out = Vec::new();
	CggetCli::parse_from(args("cgget /a")).run(&manager, &mut out).unwrap();
	insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
	/a:
	cpu.max: max 100000
	cpu.weight: 100
	memory.max: max
	");

	let mut out = Vec::new();
	CggetCli::parse_from(args("cgget -r cpu.cfs_quota_us -r cpu.shares -r memory.limit_in_bytes a"))
		.run(&manager, &mut out)
		.unwrap();
	insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
	a:
	cpu.cfs_quota_us: -1
	cpu.shares: 1024
	memory.limit_in_bytes: 9223372036854771712
	");

	let mut out = Vec::new();
	CggetCli::parse_from(args("cgget -r cpu.weight -g cpu:a"))
		.run(&manager, &mut out)
		.unwrap();
	insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
	a:
	cpu.weight: 100
	");

	let mut out = Vec::new();
	CggetCli::parse_from(args("cgget -n -v -g memory:/a")).run(&manager, &mut out).unwrap();
	insta::assert_snapshot!(String::from_utf8(out).unwrap(), @"max");
}

#[test]
fn test_cgset_and_listing() {
	let (root, manager) = v2_tree();
	CgcreateCli::parse_from(args("cgcreate -g :/a/b -g cpu:/c")).run(&manager).unwrap();
	std::fs::write(root.path().join("a/cpu.max"), "max 100000\n").unwrap();
	CgsetCli::parse_from(args("cgset -r cpu.cfs_quota_us=50000 -r cpu.cfs_period_us=200000 /a"))
		.run(&manager)
		.unwrap();
	assert_eq!(std::fs::read_to_string(root.path().join("a/cpu.max")).unwrap(), "50000 200000\n");

	CgsetCli::parse_from(args("cgset --copy-from /a c")).run(&manager).unwrap();
	assert_eq!(std::fs::read_to_string(root.path().join("c/cpu.max")).unwrap(), "50000 200000\n");

	let mut out = Vec::new();
	LscgroupCli::parse_from(args("lscgroup")).run(&manager, &mut out).unwrap();
	insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
	:/a
	:/a/b
	:/c
	");

	let mut out = Vec::new();
	LssubsysCli::parse_from(args("lssubsys")).run(&manager, &mut out).unwrap();
	assert!(out.is_empty());

	std::fs::remove_file(root.path().join("a/cpu.max")).unwrap();
	CgdeleteCli::parse_from(args("cgdelete -r -g :/a")).run(&manager).unwrap();
	assert!(!root.path().join("a").exists());
}
