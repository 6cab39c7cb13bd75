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

//! Presentation of legacy (v1) parameter names on the unified hierarchy.
//!
//! Tools written for cgroup v1 set `cpu.shares` or `memory.limit_in_bytes`;
//! cgroup2 spells these `cpu.weight` and `memory.max`, sometimes with a
//! different encoding. [`RULES`] lists every parameter that differs. Anything
//! not listed is assumed to have the same name and encoding on both sides.
//!
//! The `cpu.shares` conversion is lossy: `1024` becomes weight `100`, which
//! reads back as `1024`, but `1000` becomes `97`, which reads back as `993`.

use std::path::Path;

use tracing::warn;

use crate::attr;
use crate::error::Error;
use crate::error::Result;

/// What the unified interface reports for an unlimited memory value, in v1 terms.
pub const MEMORY_UNLIMITED: u64 = (1 << 63) - 4096;

/// One legacy parameter backed by a file, or one field of a two-field file,
/// in the unified hierarchy.
pub struct TranslationRule {
	pub legacy_key: &'static str,
	pub unified_file: &'static str,
	/// Which whitespace-separated field the parameter occupies, for `cpu.max`-style files.
	pub field: Option<usize>,
	pub encode: fn(&str) -> Option<String>,
	pub decode: fn(&str) -> Option<String>,
}

pub static RULES: &[TranslationRule] = &[
	TranslationRule {
		legacy_key: "cpu.cfs_period_us",
		unified_file: "cpu.max",
		field: Some(1),
		encode: passthrough,
		decode: passthrough,
	},
	TranslationRule {
		legacy_key: "cpu.cfs_quota_us",
		unified_file: "cpu.max",
		field: Some(0),
		encode: encode_unlimited,
		decode: decode_unlimited,
	},
	TranslationRule {
		legacy_key: "cpu.rt_period_us",
		unified_file: "cpu.rt.max",
		field: Some(1),
		encode: passthrough,
		decode: passthrough,
	},
	TranslationRule {
		legacy_key: "cpu.rt_runtime_us",
		unified_file: "cpu.rt.max",
		field: Some(0),
		encode: encode_unlimited,
		decode: decode_unlimited,
	},
	TranslationRule {
		legacy_key: "cpu.shares",
		unified_file: "cpu.weight",
		field: None,
		encode: shares_to_weight,
		decode: weight_to_shares,
	},
	TranslationRule {
		legacy_key: "memory.limit_in_bytes",
		unified_file: "memory.max",
		field: None,
		encode: passthrough,
		decode: decode_memory,
	},
	TranslationRule {
		legacy_key: "memory.soft_limit_in_bytes",
		unified_file: "memory.high",
		field: None,
		encode: passthrough,
		decode: decode_memory,
	},
];

pub fn rule_for(legacy_key: &str) -> Option<&'static TranslationRule> {
	RULES.iter().find(|rule| rule.legacy_key == legacy_key)
}

fn passthrough(value: &str) -> Option<String> {
	Some(value.to_string())
}

fn encode_unlimited(value: &str) -> Option<String> {
	Some(if value == "-1" { "max" } else { value }.to_string())
}

fn decode_unlimited(value: &str) -> Option<String> {
	Some(if value == "max" { "-1" } else { value }.to_string())
}

fn shares_to_weight(value: &str) -> Option<String> {
	let shares: i64 = value.trim().parse().ok()?;
	Some(shares.checked_mul(100)?.div_euclid(1024).to_string())
}

fn weight_to_shares(value: &str) -> Option<String> {
	let weight: i64 = value.trim().parse().ok()?;
	Some(weight.checked_mul(1024)?.div_euclid(100).to_string())
}

fn decode_memory(value: &str) -> Option<String> {
	Some(if value == "max" { MEMORY_UNLIMITED.to_string() } else { value.to_string() })
}

/// Outcome of a translated read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation<T> {
	Translated(T),
	/// The key has a rule but the group lacks the unified file, usually because
	/// the controller is not enabled there. Nothing was read or written.
	TargetMissing,
	/// The key has no rule; the caller should use the literal file name.
	Untranslated,
}

/// Writes legacy parameter `key` into the unified files of `group_dir`.
pub fn write(group_dir: &Path, key: &str, value: &str) -> Result<Translation<()>> {
	let Some(rule) = rule_for(key) else {
		return Ok(Translation::Untranslated);
	};
	let path = group_dir.join(rule.unified_file);
	if !path.is_file() {
		warn!(key, file = rule.unified_file, group = %group_dir.display(), "unified file missing, skipping");
		return Ok(Translation::TargetMissing);
	}
	let encoded = (rule.encode)(value).ok_or_else(|| Error::InvalidValue {
		key: key.to_string(),
		value: value.to_string(),
	})?;
	match rule.field {
		Some(index) => attr::write_field(&path, index, &encoded)?,
		None => attr::write_all(&path, format!("{encoded}\n"))?,
	}
	Ok(Translation::Translated(()))
}

/// Reads legacy parameter `key` from the unified files of `group_dir`.
pub fn read(group_dir: &Path, key: &str) -> Result<Translation<String>> {
	let Some(rule) = rule_for(key) else {
		return Ok(Translation::Untranslated);
	};
	let path = group_dir.join(rule.unified_file);
	if !path.is_file() {
		warn!(key, file = rule.unified_file, group = %group_dir.display(), "unified file missing, skipping");
		return Ok(Translation::TargetMissing);
	}
	let raw = match rule.field {
		Some(index) => attr::read_field(&path, index)?,
		None => attr::read_string(&path)?.trim().to_string(),
	};
	let decoded = (rule.decode)(&raw).ok_or_else(|| Error::MalformedAttribute {
		path: path.clone(),
		content: raw.clone(),
	})?;
	Ok(Translation::Translated(decoded))
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	fn group() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("cpu.max"), "50000 100000\n").unwrap();
		fs::write(dir.path().join("cpu.weight"), "100\n").unwrap();
		fs::write(dir.path().join("memory.max"), "max\n").unwrap();
		dir
	}

	fn content(dir: &tempfile::TempDir, name: &str) -> String {
		fs::read_to_string(dir.path().join(name)).unwrap()
	}

	#[test]
	fn shares_formulas() {
		for shares in [0i64, 2, 10, 100, 512, 1000, 1024, 2048, 262144] {
			let weight = shares_to_weight(&shares.to_string()).unwrap();
			assert_eq!(weight, (shares * 100 / 1024).to_string());
			let back = weight_to_shares(&weight).unwrap();
			assert_eq!(back, (weight.parse::<i64>().unwrap() * 1024 / 100).to_string());
		}
		assert_eq!(shares_to_weight("1000").as_deref(), Some("97"));
		assert_eq!(weight_to_shares("97").as_deref(), Some("993"));
		assert_eq!(shares_to_weight("lots"), None);
	}

	#[test]
	fn unlimited_sentinel() {
		assert_eq!(encode_unlimited("-1").as_deref(), Some("max"));
		assert_eq!(decode_unlimited(&encode_unlimited("-1").unwrap()).as_deref(), Some("-1"));
		assert_eq!(decode_unlimited("max").as_deref(), Some("-1"));
		assert_eq!(encode_unlimited("25000").as_deref(), Some("25000"));
	}

	#[test]
	fn memory_max_reads_as_number() {
		assert_eq!(MEMORY_UNLIMITED, 9223372036854771712);
		assert_eq!(decode_memory("max").as_deref(), Some("9223372036854771712"));
		assert_eq!(decode_memory("4096").as_deref(), Some("4096"));
	}

	#[test]
	fn period_write_keeps_quota() {
		let dir = group();
		assert_eq!(write(dir.path(), "cpu.cfs_period_us", "200000").unwrap(), Translation::Translated(()));
		assert_eq!(content(&dir, "cpu.max"), "50000 200000\n");
		assert_eq!(read(dir.path(), "cpu.cfs_period_us").unwrap(), Translation::Translated("200000".to_string()));
	}

	#[test]
	fn quota_round_trip() {
		let dir = group();
		write(dir.path(), "cpu.cfs_quota_us", "-1").unwrap();
		assert_eq!(content(&dir, "cpu.max"), "max 100000\n");
		assert_eq!(read(dir.path(), "cpu.cfs_quota_us").unwrap(), Translation::Translated("-1".to_string()));
	}

	#[test]
	fn shares_write_and_read() {
		let dir = group();
		write(dir.path(), "cpu.shares", "2048").unwrap();
		assert_eq!(content(&dir, "cpu.weight"), "200\n");
		assert_eq!(read(dir.path(), "cpu.shares").unwrap(), Translation::Translated("2048".to_string()));
		assert!(matches!(write(dir.path(), "cpu.shares", "x"), Err(Error::InvalidValue { .. })));
	}

	#[test]
	fn memory_write_is_not_translated_back() {
		let dir = group();
		assert_eq!(
			read(dir.path(), "memory.limit_in_bytes").unwrap(),
			Translation::Translated("9223372036854771712".to_string())
		);
		write(dir.path(), "memory.limit_in_bytes", "1048576").unwrap();
		assert_eq!(content(&dir, "memory.max"), "1048576\n");
		assert_eq!(
			read(dir.path(), "memory.limit_in_bytes").unwrap(),
			Translation::Translated("1048576".to_string())
		);
		write(dir.path(), "memory.limit_in_bytes", "-1").unwrap();
		assert_eq!(content(&dir, "memory.max"), "-1\n");
	}

	#[test]
	fn realtime_fields() {
		let dir = group();
		fs::write(dir.path().join("cpu.rt.max"), "max 1000000\n").unwrap();
		write(dir.path(), "cpu.rt_period_us", "500000").unwrap();
		assert_eq!(content(&dir, "cpu.rt.max"), "max 500000\n");
		assert_eq!(read(dir.path(), "cpu.rt_runtime_us").unwrap(), Translation::Translated("-1".to_string()));
		assert_eq!(read(dir.path(), "cpu.rt_period_us").unwrap(), Translation::Translated("500000".to_string()));

		write(dir.path(), "cpu.rt_runtime_us", "950000").unwrap();
		assert_eq!(content(&dir, "cpu.rt.max"), "950000 500000\n");
		write(dir.path(), "cpu.rt_runtime_us", "-1").unwrap();
		assert_eq!(content(&dir, "cpu.rt.max"), "max 500000\n");
	}

	#[test]
	fn memory_high_reads_as_number() {
		let dir = group();
		fs::write(dir.path().join("memory.high"), "max\n").unwrap();
		assert_eq!(
			read(dir.path(), "memory.soft_limit_in_bytes").unwrap(),
			Translation::Translated("9223372036854771712".to_string())
		);
		write(dir.path(), "memory.soft_limit_in_bytes", "2097152").unwrap();
		assert_eq!(content(&dir, "memory.high"), "2097152\n");
		assert_eq!(
			read(dir.path(), "memory.soft_limit_in_bytes").unwrap(),
			Translation::Translated("2097152".to_string())
		);
	}

	#[test]
	fn missing_target_is_skipped() {
		let dir = group();
		assert_eq!(write(dir.path(), "cpu.rt_runtime_us", "-1").unwrap(), Translation::TargetMissing);
		assert_eq!(read(dir.path(), "memory.soft_limit_in_bytes").unwrap(), Translation::TargetMissing);
		assert!(!dir.path().join("cpu.rt.max").exists());
		assert!(!dir.path().join("cpu.rt_runtime_us").exists());
	}

	#[test]
	fn unknown_keys_are_untranslated() {
		let dir = group();
		assert_eq!(write(dir.path(), "pids.max", "10").unwrap(), Translation::Untranslated);
		assert_eq!(read(dir.path(), "cpu.weight").unwrap(), Translation::Untranslated);
	}
}
