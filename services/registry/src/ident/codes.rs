//! Issued-code categories and country formatting tables.
//!
//! Each registration carries two human-readable codes drawn from separate
//! counter families: a regional code (two-letter prefix) and an
//! identification number (three-letter prefix). The numeric part is the
//! counter value zero-padded to three digits; values past 999 keep growing
//! unpadded.

use serde::Serialize;

/// Which counter family a code is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    RegionalCode,
    IdentificationNumber,
}

impl Category {
    /// The `category_key` stored in the counters table.
    pub fn key(&self) -> &'static str {
        match self {
            Self::RegionalCode => "regionalCode",
            Self::IdentificationNumber => "identificationNumber",
        }
    }

    /// The country-specific prefix this category renders with.
    pub fn prefix_for(&self, country: &str) -> &'static str {
        match self {
            Self::RegionalCode => regional_prefix(country),
            Self::IdentificationNumber => country_code(country),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Zero-padding width of the numeric part.
pub const VALUE_WIDTH: usize = 3;

/// Render a counter value as a formatted code for this category and country.
pub fn format_code(category: Category, country: &str, value: i64) -> String {
    format!(
        "{}{:0width$}",
        category.prefix_for(country),
        value,
        width = VALUE_WIDTH
    )
}

fn regional_prefix(country: &str) -> &'static str {
    match country {
        "Liberia" => "ML",
        "Sierra Leone" => "SL",
        "Guinea" => "GN",
        "Ivory Coast" => "IC",
        "Ghana" => "GH",
        "Nigeria" => "NG",
        "Mali" => "MA",
        "Burkina Faso" => "BF",
        "Senegal" => "SN",
        "Gambia" => "GM",
        // Unlisted countries must still get a code; they share the
        // fallback prefix and its counter scope stays per-country.
        _ => "XX",
    }
}

fn country_code(country: &str) -> &'static str {
    match country {
        "Liberia" => "LIB",
        "Sierra Leone" => "SLE",
        "Guinea" => "GIN",
        "Ivory Coast" => "IVC",
        "Ghana" => "GHA",
        "Nigeria" => "NGA",
        "Mali" => "MLI",
        "Burkina Faso" => "BFA",
        "Senegal" => "SEN",
        "Gambia" => "GMB",
        _ => "XXX",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_keys() {
        assert_eq!(Category::RegionalCode.key(), "regionalCode");
        assert_eq!(Category::IdentificationNumber.key(), "identificationNumber");
    }

    #[test]
    fn test_known_country_prefixes() {
        assert_eq!(Category::RegionalCode.prefix_for("Liberia"), "ML");
        assert_eq!(Category::RegionalCode.prefix_for("Gambia"), "GM");
        assert_eq!(Category::IdentificationNumber.prefix_for("Liberia"), "LIB");
        assert_eq!(Category::IdentificationNumber.prefix_for("Gambia"), "GMB");
    }

    #[test]
    fn test_unknown_country_falls_back() {
        assert_eq!(Category::RegionalCode.prefix_for("Atlantis"), "XX");
        assert_eq!(Category::IdentificationNumber.prefix_for("Atlantis"), "XXX");
    }

    #[test]
    fn test_format_pads_to_three_digits() {
        assert_eq!(
            format_code(Category::IdentificationNumber, "Gambia", 1),
            "GMB001"
        );
        assert_eq!(format_code(Category::RegionalCode, "Atlantis", 1), "XX001");
        assert_eq!(format_code(Category::RegionalCode, "Liberia", 42), "ML042");
    }

    #[test]
    fn test_format_grows_past_padding() {
        assert_eq!(
            format_code(Category::IdentificationNumber, "Gambia", 1000),
            "GMB1000"
        );
    }
}
