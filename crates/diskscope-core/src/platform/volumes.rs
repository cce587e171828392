/// Volume enumeration by running the platform's disk-usage command.
///
/// - Windows: `wmic logicaldisk ... /format:csv`, parsed by header name.
/// - macOS: `df -k` (1024-byte blocks).
/// - Linux: `df -B1 --output=source,size,used,avail,target`.
///
/// Only device-backed filesystems (`/dev/...`) are reported on Unix;
/// pseudo filesystems such as tmpfs and overlay are dropped. Volumes with a
/// total size of zero are discarded everywhere.
use crate::error::{EngineError, Result};
use crate::model::VolumeInfo;
use crate::path;
use std::process::Command;
use tracing::debug;

/// Where the engine gets its volume list from.
pub trait VolumeSource: Send + Sync {
    fn list(&self) -> Result<Vec<VolumeInfo>>;
}

/// Runs the real platform command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVolumeSource;

impl VolumeSource for SystemVolumeSource {
    fn list(&self) -> Result<Vec<VolumeInfo>> {
        let (program, args) = platform_command();
        let stdout = run(program, args)?;
        let volumes = parse_platform_output(&stdout)?;
        debug!("{program} reported {} volumes", volumes.len());
        Ok(volumes)
    }
}

#[cfg(windows)]
fn platform_command() -> (&'static str, &'static [&'static str]) {
    (
        "wmic",
        &[
            "logicaldisk",
            "get",
            "Caption,FreeSpace,Size,VolumeName",
            "/format:csv",
        ],
    )
}

#[cfg(target_os = "macos")]
fn platform_command() -> (&'static str, &'static [&'static str]) {
    ("df", &["-k"])
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_command() -> (&'static str, &'static [&'static str]) {
    ("df", &["-B1", "--output=source,size,used,avail,target"])
}

#[cfg(windows)]
fn parse_platform_output(stdout: &str) -> Result<Vec<VolumeInfo>> {
    parse_wmic_csv(stdout)
}

#[cfg(target_os = "macos")]
fn parse_platform_output(stdout: &str) -> Result<Vec<VolumeInfo>> {
    Ok(parse_df_macos(stdout))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn parse_platform_output(stdout: &str) -> Result<Vec<VolumeInfo>> {
    Ok(parse_df_linux(stdout))
}

/// Run `program` and return its stdout. A spawn failure or non-zero exit
/// becomes [`EngineError::PlatformCommandFailed`].
fn run(program: &str, args: &[&str]) -> Result<String> {
    let display = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| EngineError::PlatformCommandFailed {
            command: display.clone(),
            details: err.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::PlatformCommandFailed {
            command: display,
            details: format!("{}: {}", output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `wmic logicaldisk get Caption,FreeSpace,Size,VolumeName /format:csv`.
///
/// wmic prefixes the output with blank lines, adds a `Node` column and ends
/// lines with `\r\r\n`. Columns are looked up by header name, so their order
/// does not matter. Drives without media report an empty `Size` and are
/// dropped.
pub fn parse_wmic_csv(stdout: &str) -> Result<Vec<VolumeInfo>> {
    let cleaned: String = stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(cleaned.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::PlatformCommandFailed {
                command: "wmic".into(),
                details: format!("missing column {name}"),
            })
    };
    let caption = column("Caption")?;
    let free = column("FreeSpace")?;
    let size = column("Size")?;
    let label = column("VolumeName").ok();

    let mut volumes = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(drive) = record.get(caption).filter(|c| !c.is_empty()) else {
            continue;
        };
        let total = parse_u64(record.get(size));
        let available = parse_u64(record.get(free)).min(total);
        let name = label
            .and_then(|i| record.get(i))
            .filter(|l| !l.is_empty())
            .unwrap_or(drive);
        push_volume(&mut volumes, name, drive, total, total - available, available);
    }
    Ok(volumes)
}

/// Parse macOS `df -k` output.
///
/// Newer releases add inode columns between `Capacity` and `Mounted on`, so
/// the number of leading fields is taken from the header.
pub fn parse_df_macos(stdout: &str) -> Vec<VolumeInfo> {
    let mut lines = stdout.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let Some(fields) = header
        .split_whitespace()
        .position(|token| token.eq_ignore_ascii_case("mounted"))
    else {
        return Vec::new();
    };

    let mut volumes = Vec::new();
    for line in lines {
        let Some((cols, mount)) = split_fields(line, fields) else {
            continue;
        };
        if !cols[0].starts_with("/dev/") {
            continue;
        }
        let total = parse_u64(Some(cols[1])).saturating_mul(1024);
        let used = parse_u64(Some(cols[2])).saturating_mul(1024);
        let available = parse_u64(Some(cols[3])).saturating_mul(1024);
        push_volume(&mut volumes, "", mount, total, used, available);
    }
    volumes
}

/// Parse `df -B1 --output=source,size,used,avail,target`.
pub fn parse_df_linux(stdout: &str) -> Vec<VolumeInfo> {
    let mut volumes = Vec::new();
    for line in stdout.lines().skip(1) {
        let Some((cols, mount)) = split_fields(line, 4) else {
            continue;
        };
        if !cols[0].starts_with("/dev/") {
            continue;
        }
        push_volume(
            &mut volumes,
            "",
            mount,
            parse_u64(Some(cols[1])),
            parse_u64(Some(cols[2])),
            parse_u64(Some(cols[3])),
        );
    }
    volumes
}

/// The single record returned when enumeration fails and nothing is cached.
/// Capacity figures are placeholders, hence `approximate`.
pub fn fallback_volumes() -> Vec<VolumeInfo> {
    const TOTAL: u64 = 500 * 1_000_000_000;
    const USED: u64 = 250 * 1_000_000_000;
    let root = path::primary_root();
    vec![VolumeInfo {
        name: path::display_name(root),
        path: root.to_string(),
        total_bytes: TOTAL,
        used_bytes: USED,
        available_bytes: TOTAL - USED,
        approximate: true,
    }]
}

fn push_volume(
    volumes: &mut Vec<VolumeInfo>,
    name: &str,
    mount: &str,
    total: u64,
    used: u64,
    available: u64,
) {
    if total == 0 {
        return;
    }
    let key = path::normalize(mount);
    let name = if name.is_empty() {
        path::display_name(&key)
    } else {
        name.to_string()
    };
    volumes.push(VolumeInfo {
        name,
        path: key,
        total_bytes: total,
        used_bytes: used,
        available_bytes: available,
        approximate: false,
    });
}

fn parse_u64(field: Option<&str>) -> u64 {
    field.and_then(|f| f.trim().parse().ok()).unwrap_or(0)
}

/// Split off the first `n` whitespace-separated fields of `line` and return
/// them with the rest of the line, which keeps its inner spaces (mount
/// points may contain them).
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut cols = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        cols.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    let rest = rest.trim_end();
    if rest.is_empty() {
        return None;
    }
    Some((cols, rest))
}
