//! Parsers for the container engine's compact text output
//!
//! `docker stats` reports quantities as human-readable size strings
//! ("1.5GiB / 8GiB", "12.34%"). Parse failures default to zero for the
//! affected field; they never abort the enclosing sample.

/// Convert a size string to bytes.
///
/// Decimal units (kB, MB, GB, TB) use factor 1000, binary units (KiB,
/// MiB, GiB, TiB) factor 1024. Unparseable input is 0 bytes.
pub fn parse_size(input: &str) -> u64 {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "0" || trimmed == "0B" {
        return 0;
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (num_str, unit) = trimmed.split_at(split);
    let Ok(value) = num_str.parse::<f64>() else {
        return 0;
    };
    let unit = unit.trim();
    if !unit.chars().all(|c| c.is_ascii_alphabetic()) {
        return 0;
    }

    let multiplier: u64 = match unit.to_ascii_lowercase().as_str() {
        "kb" | "k" => 1000,
        "mb" | "m" => 1000 * 1000,
        "gb" | "g" => 1000 * 1000 * 1000,
        "tb" | "t" => 1000 * 1000 * 1000 * 1000,
        "kib" => 1024,
        "mib" => 1024 * 1024,
        "gib" => 1024 * 1024 * 1024,
        "tib" => 1024 * 1024 * 1024 * 1024,
        "b" | "" => 1,
        _ => 1,
    };

    (value * multiplier as f64) as u64
}

/// Parse a "used / total" pair, each side a size string
pub fn parse_size_pair(input: &str) -> Option<(u64, u64)> {
    let (left, right) = input.split_once(" / ")?;
    Some((parse_size(left), parse_size(right)))
}

/// Parse a CPU percentage like "12.34%"; 0 on failure
pub fn parse_cpu_percent(input: &str) -> f64 {
    input
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .unwrap_or(0.0)
}

/// One line of `docker stats` output:
/// `{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}\t{{.BlockIO}}`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsLine {
    pub cpu_percent: f64,
    pub mem_used: u64,
    pub mem_total: u64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
}

pub fn parse_stats_line(line: &str) -> Option<StatsLine> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() < 4 {
        return None;
    }

    let (mem_used, mem_total) = parse_size_pair(fields[1]).unwrap_or((0, 0));
    let (net_rx, net_tx) = parse_size_pair(fields[2]).unwrap_or((0, 0));
    let (block_read, block_write) = parse_size_pair(fields[3]).unwrap_or((0, 0));

    Some(StatsLine {
        cpu_percent: parse_cpu_percent(fields[0]),
        mem_used,
        mem_total,
        net_rx,
        net_tx,
        block_read,
        block_write,
    })
}

/// A container is live when its engine status starts with "Up"
pub fn is_running(status: &str) -> bool {
    status.trim_start().starts_with("Up")
}
