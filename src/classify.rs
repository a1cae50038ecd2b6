//! Region tagging of decoded payloads

use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    North,
    Central,
    South,
    Other,
}

impl Region {
    pub const fn label(self) -> &'static str {
        match self {
            Region::North => "Miền Bắc",
            Region::Central => "Miền Trung",
            Region::South => "Miền Nam",
            Region::Other => "Miền khác",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

// First match wins. Prefixes are case-sensitive, keywords are not.
const RULES: [(&str, &str, Region); 3] = [
    ("MB-", "mien bac", Region::North),
    ("MT-", "mien trung", Region::Central),
    ("MN-", "mien nam", Region::South),
];

/// Map a payload to its region; total over every string
pub fn classify(payload: &str) -> Region {
    let lower = payload.to_lowercase();
    RULES
        .iter()
        .find(|(prefix, keyword, _)| payload.starts_with(prefix) || lower.contains(keyword))
        .map(|&(_, _, region)| region)
        .unwrap_or(Region::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(classify("MB-123"), Region::North);
        assert_eq!(classify("MT-9"), Region::Central);
        assert_eq!(classify("MN-1"), Region::South);
    }

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(classify("xxx mien trung xxx"), Region::Central);
        assert_eq!(classify("Kho MIEN BAC so 2"), Region::North);
        assert_eq!(classify("mien nam"), Region::South);
    }

    #[test]
    fn prefix_is_case_sensitive() {
        assert_eq!(classify("mb-123"), Region::Other);
        assert_eq!(classify("Mn-1"), Region::Other);
    }

    #[test]
    fn first_rule_wins() {
        // North prefix beats a later central keyword
        assert_eq!(classify("MB- mien trung"), Region::North);
        assert_eq!(classify("MN- mien bac"), Region::North);
    }

    #[test]
    fn fallback_covers_empty_and_unicode() {
        assert_eq!(classify(""), Region::Other);
        assert_eq!(classify("Miền Bắc"), Region::Other);
        assert_eq!(classify("https://example.com"), Region::Other);
    }

    #[test]
    fn labels() {
        assert_eq!(classify("MB-123").label(), "Miền Bắc");
        assert_eq!(Region::Other.to_string(), "Miền khác");
        assert_eq!(serde_json::to_string(&Region::South).unwrap(), "\"Miền Nam\"");
    }
}
