//! Subset name derivation shared by both routers

/// Characters dropped from a version before it becomes part of a subset name
const STRIPPED: [char; 4] = ['.', '-', '/', '_'];

/// Derive the canonical subset name for a service version and build number
///
/// `"2.1.3-rc"` with build `7` becomes `"213rc-7"`. Characters other than the
/// stripped separators are passed through as they are.
pub fn resolve_subset_name(version: &str, build: u64) -> String {
    let version: String = version
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect::<String>()
        .to_lowercase();

    format!("{}-{}", version, build)
}
