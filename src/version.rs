use regex::Regex;

/// Version used in file names when the header doesn't provide one
pub const UNKNOWN: &str = "unknown";

/// Extracts `FIRMWARE_VERSION` from the contents of a C header
pub fn firmware_version(header: &str) -> Option<&str> {
    let re = Regex::new(r#"#define\s+FIRMWARE_VERSION\s+"([^"]+)""#).expect("BUG: Malformed Regex");

    re.captures(header)
        .and_then(|cs| cs.get(1))
        .map(|m| m.as_str())
}
