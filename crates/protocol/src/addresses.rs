//! Persisted address list and device identifiers.

use crate::constants::DEVICE_ID_PREFIX;

/// Splits a stored comma-separated address list. Blank entries are dropped,
/// so an empty value is an empty list.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins addresses for storage.
pub fn format_address_list<S: AsRef<str>>(addresses: &[S]) -> String {
    addresses
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Stable device id for a printer address, e.g. `manual:192.168.1.40`.
pub fn device_id_for(address: &str) -> String {
    format!("{DEVICE_ID_PREFIX}{address}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_value_is_empty_list() {
        assert!(parse_address_list("").is_empty());
        assert!(parse_address_list(" , ").is_empty());
    }

    #[test]
    fn parses_and_trims_entries() {
        assert_eq!(
            parse_address_list("10.0.0.5, printer.local,,10.0.0.6:8080"),
            vec!["10.0.0.5", "printer.local", "10.0.0.6:8080"]
        );
    }

    #[test]
    fn format_joins_with_commas() {
        assert_eq!(format_address_list::<String>(&[]), "");
        assert_eq!(format_address_list(&["a", "b"]), "a,b");
        let list = parse_address_list(&format_address_list(&["10.0.0.5", "10.0.0.6"]));
        assert_eq!(list, vec!["10.0.0.5", "10.0.0.6"]);
    }

    #[test]
    fn device_id_has_manual_prefix() {
        assert_eq!(device_id_for("192.168.1.40"), "manual:192.168.1.40");
    }
}
