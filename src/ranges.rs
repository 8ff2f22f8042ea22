use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Split range-file content into descriptor lines.
///
/// - one `"<ipv4>/<count>"` descriptor per line
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// Lines are not validated here; a bad descriptor is skipped at expansion time
/// so it never takes the rest of the file down with it.
pub fn parse_ranges_str(s: &str) -> Vec<String> {
    s.lines()
        .filter_map(|raw| {
            let line = raw.split('#').next().map(str::trim).unwrap_or("");
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect()
}

/// Load descriptor lines from a file. Errors if the file cannot be read or holds no ranges.
pub fn load_ranges_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read range file: {}", path.display()))?;
    let ranges = parse_ranges_str(&content);
    if ranges.is_empty() {
        bail!("no IP ranges to scan in {}", path.display());
    }
    Ok(ranges)
}
