//! Host list loading.

use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, UpgradeError};

/// Parse a host list: one host per line, in upgrade order.
///
/// Lines are trimmed; blank lines and `#` comments are skipped.
/// Duplicates are kept so an operator can deliberately re-upgrade a host.
pub fn parse_host_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse the host list file. An unreadable or empty list is a config error.
pub fn load_host_list(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        UpgradeError::Config(format!(
            "failed to read host list {}: {e}",
            path.display()
        ))
    })?;

    let hosts = parse_host_list(&contents);
    if hosts.is_empty() {
        return Err(UpgradeError::Config(format!(
            "host list {} contains no hosts",
            path.display()
        )));
    }

    debug!(hosts = ?hosts, "Parsed host list");
    info!(
        path = %path.display(),
        host_count = hosts.len(),
        "Loaded host list"
    );

    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_preserves_order() {
        let hosts = parse_host_list("osd-03\nosd-01\nosd-02\n");
        assert_eq!(hosts, vec!["osd-03", "osd-01", "osd-02"]);
    }

    #[test]
    fn test_parse_skips_blank_and_whitespace_lines() {
        let hosts = parse_host_list("\nosd-01\n   \n\t\nosd-02\n\n");
        assert_eq!(hosts, vec!["osd-01", "osd-02"]);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let hosts = parse_host_list("  osd-01  \r\n\tosd-02\n");
        assert_eq!(hosts, vec!["osd-01", "osd-02"]);
    }

    #[test]
    fn test_parse_keeps_duplicates() {
        let hosts = parse_host_list("osd-01\nosd-01\n");
        assert_eq!(hosts, vec!["osd-01", "osd-01"]);
    }

    #[test]
    fn test_parse_skips_comments() {
        let hosts = parse_host_list("# rack a\nosd-01\n  # osd-02 out for repair\nosd-03\n");
        assert_eq!(hosts, vec!["osd-01", "osd-03"]);
    }

    #[test]
    fn test_parse_whitespace_only_input() {
        assert!(parse_host_list(" \n\t\n\n").is_empty());
    }

    #[test]
    fn test_load_host_list_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.11").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.12").unwrap();

        let hosts = load_host_list(file.path()).unwrap();
        assert_eq!(hosts, vec!["10.0.0.11", "10.0.0.12"]);
    }

    #[test]
    fn test_load_empty_host_list_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();

        let err = load_host_list(file.path()).unwrap_err();
        assert!(matches!(err, UpgradeError::Config(_)));
        assert!(err.to_string().contains("contains no hosts"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load_host_list(Path::new("/nonexistent/hosts.txt")).unwrap_err();
        assert!(matches!(err, UpgradeError::Config(_)));
    }
}
