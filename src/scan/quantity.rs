//! Kubernetes resource quantity parsing.
//!
//! CPU is normalised to milli-cores and memory/storage to bytes. Unit
//! conversion for display happens in the output layer only.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Parse a quantity string (`500m`, `2`, `1.5Gi`, `128974848`, `1e3`) into its base value.
///
/// Returns `None` for anything that is not a valid quantity.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        exp if exp.starts_with('e') || exp.starts_with('E') => {
            let power: i32 = exp[1..].parse().ok()?;
            10f64.powi(power)
        }
        _ => return None,
    };

    Some(value * multiplier)
}

/// CPU quantity in milli-cores, rounded up like the API server does.
pub fn cpu_millis(quantity: &Quantity) -> u64 {
    parse_quantity(&quantity.0)
        .map(|cores| round_up(cores * 1000.0))
        .unwrap_or(0)
}

/// Memory or storage quantity in bytes, rounded up.
pub fn bytes(quantity: &Quantity) -> u64 {
    parse_quantity(&quantity.0)
        .map(round_up)
        .unwrap_or(0)
}

/// Round up to a whole unit, ignoring float noise from suffix scaling.
fn round_up(value: f64) -> u64 {
    let nearest = value.round();
    let rounded = if (value - nearest).abs() < 1e-6 {
        nearest
    } else {
        value.ceil()
    };
    rounded.max(0.0) as u64
}

/// Look up `cpu` in a resource list and convert to milli-cores; missing means zero.
pub fn cpu_from(resources: Option<&BTreeMap<String, Quantity>>) -> u64 {
    resources
        .and_then(|r| r.get("cpu"))
        .map(cpu_millis)
        .unwrap_or(0)
}

/// Look up a byte-valued resource (`memory`, `ephemeral-storage`); missing means zero.
pub fn bytes_from(resources: Option<&BTreeMap<String, Quantity>>, key: &str) -> u64 {
    resources
        .and_then(|r| r.get(key))
        .map(bytes)
        .unwrap_or(0)
}
