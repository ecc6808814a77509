//! Argument expansion, placeholder substitution and the memory policy

use super::manifest::{ArgumentEntry, ArgumentValue};
use super::rules::{RuleContext, evaluate_rules};
use crate::error::{Error, Result};
use std::path::Path;

/// Fixed JVM tuning flags prepended to every launch
pub const JVM_OPTIMIZE_FLAGS: &[&str] = &[
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+UseG1GC",
    "-XX:G1NewSizePercent=20",
    "-XX:G1ReservePercent=20",
    "-XX:MaxGCPauseMillis=50",
    "-Dfml.ignoreInvalidMinecraftCertificates=true",
    "-Dfml.ignorePatchDiscrepancies=true",
];

/// Classpath separator of the running OS
pub const CLASSPATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

const GIB: u64 = 1024 * 1024 * 1024;

/// Expand a manifest argument list under `ctx`
///
/// Literal entries are appended as-is; conditional entries are appended
/// (single value or array, in order) when their rules evaluate to included.
pub fn expand_arguments(entries: &[ArgumentEntry], ctx: &RuleContext) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            ArgumentEntry::Literal(value) => out.push(value.clone()),
            ArgumentEntry::Conditional(conditional) => {
                let included = match evaluate_rules(&conditional.rules, ctx) {
                    Ok(included) => included,
                    Err(e) if ctx.tolerant => {
                        tracing::warn!(error = %e, "argument rule failed, entry skipped");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !included {
                    continue;
                }
                match &conditional.value {
                    ArgumentValue::One(value) => out.push(value.clone()),
                    ArgumentValue::Many(values) => out.extend(values.iter().cloned()),
                }
            }
        }
    }
    Ok(out)
}

/// Substitute `${name}` tokens in one pass over the argument list
///
/// Every occurrence of every table key is replaced; keys absent from an
/// argument leave it untouched.
pub fn apply_placeholders(args: &mut [String], table: &[(String, String)]) {
    for arg in args.iter_mut() {
        for (token, value) in table {
            if arg.contains(token.as_str()) {
                *arg = arg.replace(token.as_str(), value);
            }
        }
    }
}

/// Join classpath entries and the client JAR with the OS separator
pub fn build_classpath(entries: &[std::path::PathBuf], client_jar: &Path) -> String {
    let mut parts: Vec<String> = entries
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    parts.push(client_jar.to_string_lossy().into_owned());
    parts.join(&CLASSPATH_SEPARATOR.to_string())
}

/// Compute the `-Xms`/`-Xmx` pair under the memory policy
///
/// With `total_bytes` known, a machine below `required_gib` fails the
/// launch. The ceiling is raised to at least the requirement and the floor
/// is clamped to the ceiling.
///
/// # Errors
/// [`Error::InsufficientMemory`] when installed memory is below the
/// requirement.
pub fn memory_flags(
    min_gib: u64,
    max_gib: u64,
    required_gib: u64,
    total_bytes: Option<u64>,
) -> Result<(String, String)> {
    if let Some(total) = total_bytes {
        if total < required_gib * GIB {
            tracing::error!(
                total_gib = total / GIB,
                required_gib,
                "not enough system memory to launch"
            );
            return Err(Error::InsufficientMemory {
                required_gib,
                total_gib: total / GIB,
            });
        }
    }

    let effective_max = max_gib.max(required_gib);
    let effective_min = min_gib.min(effective_max);
    Ok((
        format!("-Xms{effective_min}G"),
        format!("-Xmx{effective_max}G"),
    ))
}

/// Total physical memory in bytes, when the platform reports it
pub fn total_system_memory() -> Option<u64> {
    use sysinfo::{MemoryRefreshKind, RefreshKind, System};
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
    );
    let total = system.total_memory();
    if total == 0 { None } else { Some(total) }
}

/// Append `--server`/`--port` when a join address is configured
pub fn append_join_server(args: &mut Vec<String>, address: &str, port: &str) {
    if address.is_empty() {
        return;
    }
    args.push("--server".into());
    args.push(address.to_string());
    if !port.is_empty() {
        args.push("--port".into());
        args.push(port.to_string());
    }
}
