//! Preheat targets embedded in G-code.
//!
//! Slicers emit `M190 S<n>` (wait for bed) and `M109 S<n>` (wait for hotend)
//! near the top of a file. Only the first occurrence of each counts.

use std::sync::LazyLock;

use regex::Regex;

static BED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"M190 S([0-9]+)").unwrap_or_else(|e| unreachable!("bed pattern is valid: {e}"))
});

static HOTEND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"M109 S([0-9]+)").unwrap_or_else(|e| unreachable!("hotend pattern is valid: {e}"))
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreheatSettings {
    pub bed: Option<u16>,
    pub hotend: Option<u16>,
}

impl PreheatSettings {
    /// Extracts preheat targets from G-code bytes. Invalid UTF-8 is replaced,
    /// not rejected.
    pub fn parse(gcode: &[u8]) -> Self {
        let text = String::from_utf8_lossy(gcode);
        Self {
            bed: first_value(&BED_RE, &text),
            hotend: first_value(&HOTEND_RE, &text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bed.is_none() && self.hotend.is_none()
    }
}

fn first_value(re: &Regex, text: &str) -> Option<u16> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_targets() {
        let gcode = b"; generated\nM140 S60\nM190 S60\nM104 S200\nM109 S205\nG28\n";
        let settings = PreheatSettings::parse(gcode);
        assert_eq!(settings.bed, Some(60));
        assert_eq!(settings.hotend, Some(205));
    }

    #[test]
    fn first_occurrence_wins() {
        let gcode = b"M109 S200\nM190 S55\nM109 S215\nM190 S70\n";
        let settings = PreheatSettings::parse(gcode);
        assert_eq!(settings.hotend, Some(200));
        assert_eq!(settings.bed, Some(55));
    }

    #[test]
    fn missing_targets_are_none() {
        let settings = PreheatSettings::parse(b"G28\nG1 X10\nM109 S210\n");
        assert_eq!(settings.bed, None);
        assert_eq!(settings.hotend, Some(210));

        let settings = PreheatSettings::parse(b"");
        assert!(settings.is_empty());
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let mut gcode = vec![0xff, 0xfe, b'\n'];
        gcode.extend_from_slice(b"M190 S50\n");
        assert_eq!(PreheatSettings::parse(&gcode).bed, Some(50));
    }
}
