use std::path::{Path, PathBuf};

/// Join two paths, only including the normal components.
pub fn join_normalized(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let mut out = base.as_ref().to_path_buf();
    out.extend(path.as_ref().components().filter(|v| matches!(v, std::path::Component::Normal(_))));
    out
}

/// Format a size in bytes to a human-readable string.
/// Uses SI (kilo = 1000) units, formatted to two decimal places.
pub fn size(value: u64) -> String {
    let units = ["B", "kB", "MB", "GB", "TB"];
    let mut value = value as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < units.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, units[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_normalized() {
        assert_eq!(join_normalized("/tmp/x", "linux-64/a.tar.bz2"), PathBuf::from("/tmp/x/linux-64/a.tar.bz2"));
        assert_eq!(join_normalized("/tmp/x", "../../etc/passwd"), PathBuf::from("/tmp/x/etc/passwd"));
        assert_eq!(join_normalized("/tmp/x", "/abs/file"), PathBuf::from("/tmp/x/abs/file"));
    }

    #[test]
    fn test_size() {
        assert_eq!(size(999), "999.00 B");
        assert_eq!(size(1_500_000), "1.50 MB");
    }
}
