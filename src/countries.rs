/// A country served by the regional registry feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub code: &'static str,
    pub name: &'static str,
}

const fn c(code: &'static str, name: &'static str) -> Country {
    Country { code, name }
}

/// Countries with allocations in the APNIC delegated-stats feed.
pub const COUNTRIES: &[Country] = &[
    c("AF", "Afghanistan"),
    c("AU", "Australia"),
    c("BD", "Bangladesh"),
    c("BN", "Brunei"),
    c("BT", "Bhutan"),
    c("CN", "China"),
    c("CK", "Cook Islands"),
    c("FJ", "Fiji"),
    c("FM", "Micronesia"),
    c("GU", "Guam"),
    c("HK", "Hong Kong"),
    c("ID", "Indonesia"),
    c("IN", "India"),
    c("JP", "Japan"),
    c("KH", "Cambodia"),
    c("KI", "Kiribati"),
    c("KR", "South Korea"),
    c("LK", "Sri Lanka"),
    c("LA", "Laos"),
    c("MM", "Myanmar"),
    c("MN", "Mongolia"),
    c("MO", "Macau"),
    c("MV", "Maldives"),
    c("MY", "Malaysia"),
    c("NC", "New Caledonia"),
    c("NP", "Nepal"),
    c("NR", "Nauru"),
    c("NZ", "New Zealand"),
    c("PF", "French Polynesia"),
    c("PG", "Papua New Guinea"),
    c("PH", "Philippines"),
    c("PK", "Pakistan"),
    c("KP", "North Korea"),
    c("PW", "Palau"),
    c("SB", "Solomon Islands"),
    c("SG", "Singapore"),
    c("TH", "Thailand"),
    c("TL", "Timor-Leste"),
    c("TO", "Tonga"),
    c("TW", "Taiwan"),
    c("VU", "Vanuatu"),
    c("VN", "Vietnam"),
    c("WS", "Samoa"),
    c("US", "United States (APNIC)"),
];

/// Case-insensitive lookup by two-letter code.
pub fn lookup(code: &str) -> Option<&'static Country> {
    COUNTRIES
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code.trim()))
}

/// True for any two ASCII letters, known or not.
pub fn is_country_code(code: &str) -> bool {
    let code = code.trim();
    code.len() == 2 && code.chars().all(|ch| ch.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup("bd").map(|c| c.name), Some("Bangladesh"));
        assert_eq!(lookup(" JP ").map(|c| c.code), Some("JP"));
        assert!(lookup("ZZ").is_none());
    }

    #[test]
    fn table_has_unique_codes() {
        let mut codes: Vec<_> = COUNTRIES.iter().map(|c| c.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), COUNTRIES.len());
        assert_eq!(COUNTRIES.len(), 44);
    }

    #[test]
    fn code_shape() {
        assert!(is_country_code("np"));
        assert!(!is_country_code("NPL"));
        assert!(!is_country_code("N1"));
    }
}
