//! Unit and duration formatting.

const MONTH: i64 = 2_592_000;
const WEEK: i64 = 604_800;
const DAY: i64 = 86_400;
const HOUR: i64 = 3_600;
const MINUTE: i64 = 60;

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Coarse age, e.g. `3mo`, `2w`, `5d`, `7h`, `12min`, `40s`.
pub fn age(seconds: i64) -> String {
    if seconds > MONTH {
        format!("{}mo", seconds / MONTH)
    } else if seconds > WEEK {
        format!("{}w", seconds / WEEK)
    } else if seconds > DAY {
        format!("{}d", seconds / DAY)
    } else if seconds > HOUR {
        format!("{}h", seconds / HOUR)
    } else if seconds > MINUTE {
        format!("{}min", seconds / MINUTE)
    } else {
        format!("{}s", seconds.max(0))
    }
}

pub fn gib(bytes: u64) -> u64 {
    bytes / GIB
}

pub fn mib(bytes: u64) -> u64 {
    bytes / MIB
}

/// Millicores as cores with one decimal.
pub fn cores(milli: u64) -> String {
    format!("{:.1}", milli as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_buckets() {
        assert_eq!(age(30), "30s");
        assert_eq!(age(60), "60s");
        assert_eq!(age(61), "1min");
        assert_eq!(age(7_200), "2h");
        assert_eq!(age(86_400), "24h");
        assert_eq!(age(2 * 86_400), "2d");
        assert_eq!(age(3 * 604_800), "3w");
        assert_eq!(age(90 * 86_400), "3mo");
    }

    #[test]
    fn test_negative_age_clamped() {
        assert_eq!(age(-5), "0s");
    }

    #[test]
    fn test_units() {
        assert_eq!(gib(16 * 1024 * 1024 * 1024), 16);
        assert_eq!(gib(1024 * 1024 * 1024 - 1), 0);
        assert_eq!(mib(128 * 1024 * 1024), 128);
        assert_eq!(cores(2500), "2.5");
        assert_eq!(cores(0), "0.0");
    }
}
