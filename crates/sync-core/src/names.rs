//! Name validation and always-excluded patterns (spec §4.2, §6 "On-disk
//! conventions"). Checked before any I/O so a rejected name never reaches
//! the event stream (spec §8, invariant 7).

const RESERVED_EXACT: &[&str] = &["con", "prn", "aux", "nul"];

/// Names rejected outright, independent of the reserved-device check.
pub fn is_valid_onedrive_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    if name.starts_with(' ') || name.ends_with(' ') || name.ends_with('.') {
        return false;
    }
    if name.contains(['"', '*', ':', '<', '>', '?', '/', '\\', '|']) {
        return false;
    }

    let lower = name.to_lowercase();
    if RESERVED_EXACT.contains(&lower.as_str()) {
        return false;
    }
    if is_com_or_lpt_reserved(&lower) {
        return false;
    }
    if lower.ends_with(".lock") || lower == "desktop.ini" {
        return false;
    }
    if name.starts_with("~$") || name.contains("_vti_") {
        return false;
    }

    true
}

fn is_com_or_lpt_reserved(lower: &str) -> bool {
    for prefix in ["com", "lpt"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if rest.len() == 1 && rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Temp/partial sidecar suffixes that must never appear in the event stream
/// (spec §4.2, §6).
const EXCLUDED_SUFFIXES: &[&str] = &[
    ".partial",
    ".tmp",
    ".swp",
    ".crdownload",
    ".db-wal",
    ".db-shm",
    ".db",
];

/// `true` when a name should be silently skipped: temp/partial sidecars and
/// editor/office lock files (`~...`, `.~...`).
pub fn is_excluded_temp_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    if EXCLUDED_SUFFIXES.iter().any(|sfx| lower.ends_with(sfx)) {
        return true;
    }
    name.starts_with('~') || name.starts_with(".~")
}

/// Max relative path length (bytes) before an entry is skipped with a
/// warning rather than rejected outright (spec §4.2).
pub const MAX_RELATIVE_PATH_LEN: usize = 400;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_device_names() {
        assert!(!is_valid_onedrive_name("CON"));
        assert!(!is_valid_onedrive_name("con"));
        assert!(!is_valid_onedrive_name("COM1"));
        assert!(!is_valid_onedrive_name("lpt9"));
        assert!(is_valid_onedrive_name("COM10")); // not exactly one digit
    }

    #[test]
    fn rejects_trailing_dot_and_space() {
        assert!(!is_valid_onedrive_name("file."));
        assert!(!is_valid_onedrive_name(" file"));
        assert!(!is_valid_onedrive_name("file "));
    }

    #[test]
    fn rejects_illegal_characters() {
        for bad in ["a:b", "a*b", "a?b", "a<b", "a>b", "a|b", "a\"b"] {
            assert!(!is_valid_onedrive_name(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_office_and_sharepoint_markers() {
        assert!(!is_valid_onedrive_name("~$report.docx"));
        assert!(!is_valid_onedrive_name("desktop.ini"));
        assert!(!is_valid_onedrive_name("a_vti_b"));
        assert!(!is_valid_onedrive_name("thing.lock"));
    }

    #[test]
    fn accepts_ordinary_names() {
        assert!(is_valid_onedrive_name("readme.txt"));
        assert!(is_valid_onedrive_name("My Folder"));
    }

    #[test]
    fn excludes_temp_and_partial_suffixes() {
        assert!(is_excluded_temp_name("download.crdownload"));
        assert!(is_excluded_temp_name("state.db-wal"));
        assert!(is_excluded_temp_name("~lock.tmp"));
        assert!(is_excluded_temp_name(".~backup"));
        assert!(!is_excluded_temp_name("report.docx"));
    }
}
