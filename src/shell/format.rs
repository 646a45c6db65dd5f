//! Display formatting for attributes, sizes and dates.

use chrono::{Local, TimeZone};

use crate::ext2::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};

/// Render a mode word as a `drwxr-xr-x` style string.
pub fn permissions_string(mode: u16) -> String {
    let kind = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFREG => '-',
        _ => '?',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Render a byte count with a binary unit suffix.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Render a 32-bit unix timestamp as a local date, or the raw number when
/// it does not map to a valid time.
pub fn format_time(secs: u32) -> String {
    match Local.timestamp_opt(secs as i64, 0).single() {
        Some(when) => when.format("%d/%m/%Y %H:%M").to_string(),
        None => secs.to_string(),
    }
}

/// Render a fixed-size, NUL-padded label field (volume name, mount path).
pub fn fixed_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
