//! Version parsing for release strings (`1.1.0`, `4.9`, `1.2.0-rc1`) and
//! server strings (`5.5.5-10.1.44-MariaDB`, `7.4.3-1ubuntu1`).

use std::cmp::Ordering;

use semver::Version;

/// Parses a release version, padding missing components (`4.9` → `4.9.0`)
/// and dropping components beyond the third.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    if raw.is_empty() {
        return None;
    }

    let split_at = raw.find(|ch| ch == '-' || ch == '+').unwrap_or(raw.len());
    let (numeric, suffix) = raw.split_at(split_at);

    let mut parts = [0_u64; 3];
    let mut seen = 0_usize;
    for (index, part) in numeric.split('.').enumerate() {
        let value = part.parse::<u64>().ok()?;
        if index < parts.len() {
            parts[index] = value;
        }
        seen += 1;
    }
    if seen == 0 {
        return None;
    }

    Version::parse(&format!("{}.{}.{}{}", parts[0], parts[1], parts[2], suffix)).ok()
}

/// Parses the version a PHP or database server reports, ignoring any
/// distribution suffix.
pub fn parse_server(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let end = raw
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(raw.len());
    parse_lenient(raw[..end].trim_end_matches('.'))
}

/// Orders two release strings. Strings that do not parse sort before those
/// that do and fall back to byte order among themselves.
pub fn compare(left: &str, right: &str) -> Ordering {
    match (parse_lenient(left), parse_lenient(right)) {
        (Some(left), Some(right)) => left.cmp_precedence(&right),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

pub fn is_older(version: &str, than: &str) -> bool {
    compare(version, than) == Ordering::Less
}

pub fn is_newer(version: &str, than: &str) -> bool {
    compare(version, than) == Ordering::Greater
}

/// `true` when `actual` satisfies the `required` minimum server version.
/// An unparseable actual version never satisfies a requirement; a missing or
/// unparseable requirement is always satisfied.
pub fn server_satisfies(actual: &str, required: &str) -> bool {
    let Some(required) = parse_server(required) else {
        return true;
    };
    match parse_server(actual) {
        Some(actual) => actual >= required,
        None => false,
    }
}

/// A dash marks alpha, beta, RC and nightly builds.
pub fn is_development_build(version: &str) -> bool {
    version.contains('-')
}

/// The first two dotted components: `1.1.3` → `1.1`, `3.7-beta2` → `3.7`.
pub fn branch(version: &str) -> String {
    version
        .split(['.', '-'])
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}
