//! Lenient interpreter version parsing.

use semver::Version;

/// Parses a version token, padding missing components and ignoring
/// suffixes.
///
/// `3.11` becomes `3.11.0`; `3.12.1rc2` and `3.12.1+` become `3.12.1`. A
/// leading `v` is accepted.
///
/// # Example
///
/// ```
/// use mapforge_plugins::runtime::parse_lenient;
/// use semver::Version;
///
/// assert_eq!(parse_lenient("3.11"), Some(Version::new(3, 11, 0)));
/// assert_eq!(parse_lenient("Python"), None);
/// ```
#[must_use]
pub fn parse_lenient(token: &str) -> Option<Version> {
    let trimmed = token.trim().trim_start_matches('v');
    let numeric_end = trimmed
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(trimmed.len());
    let (numeric, _) = trimmed.split_at(numeric_end);

    let mut components = numeric
        .split('.')
        .filter(|part| !part.is_empty())
        .map(str::parse::<u64>);
    let major = components.next()?.ok()?;
    let minor = components.next().transpose().ok()?.unwrap_or(0);
    let patch = components.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Finds the first whitespace-separated token in `output` that parses as a
/// version.
///
/// Interpreters print `Python 3.11.4` or similar, sometimes on stderr.
#[must_use]
pub fn find_version(output: &str) -> Option<Version> {
    output.split_whitespace().find_map(parse_lenient)
}
