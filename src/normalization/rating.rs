use serde::{Deserialize, Serialize};
use std::fmt;

/// Age ratings a game record may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgeRating {
    #[default]
    #[serde(rename = "PEGI_3")]
    Pegi3,
    #[serde(rename = "PEGI_7")]
    Pegi7,
    #[serde(rename = "PEGI_12")]
    Pegi12,
    #[serde(rename = "PEGI_16")]
    Pegi16,
    #[serde(rename = "PEGI_18")]
    Pegi18,
}

impl AgeRating {
    pub const ALL: [AgeRating; 5] = [
        AgeRating::Pegi3,
        AgeRating::Pegi7,
        AgeRating::Pegi12,
        AgeRating::Pegi16,
        AgeRating::Pegi18,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRating::Pegi3 => "PEGI_3",
            AgeRating::Pegi7 => "PEGI_7",
            AgeRating::Pegi12 => "PEGI_12",
            AgeRating::Pegi16 => "PEGI_16",
            AgeRating::Pegi18 => "PEGI_18",
        }
    }

    /// Parse a compact code such as `PEGI16` or `pegi_16`.
    pub fn from_code(code: &str) -> Option<Self> {
        let compact: String = code
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().replace('_', "") == compact)
    }

    /// Interpret an icon reference from a detail page, e.g. `#pegi_16` or
    /// `/static/icons/age/pegi_18.svg`.
    ///
    /// The reference is reduced to its last path/fragment segment, the `.svg`
    /// suffix and underscores are dropped and the remainder is uppercased.
    pub fn from_icon_reference(reference: &str) -> Option<Self> {
        let tail = reference
            .trim()
            .rsplit(['/', '#'])
            .next()
            .unwrap_or_default();
        let tail = tail.strip_suffix(".svg").unwrap_or(tail);
        let code = tail.replace('_', "").to_ascii_uppercase();
        if code.is_empty() {
            return None;
        }
        Self::from_code(&code)
    }
}

impl fmt::Display for AgeRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fragment_references() {
        assert_eq!(
            AgeRating::from_icon_reference("#pegi_16"),
            Some(AgeRating::Pegi16)
        );
        assert_eq!(
            AgeRating::from_icon_reference("#PEGI_7"),
            Some(AgeRating::Pegi7)
        );
    }

    #[test]
    fn parses_path_references_with_suffix() {
        assert_eq!(
            AgeRating::from_icon_reference("/static/icons/age/pegi_18.svg"),
            Some(AgeRating::Pegi18)
        );
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(AgeRating::from_icon_reference("#esrb_m"), None);
        assert_eq!(AgeRating::from_icon_reference(""), None);
    }

    #[test]
    fn default_is_pegi_3() {
        assert_eq!(AgeRating::default(), AgeRating::Pegi3);
        assert_eq!(AgeRating::default().to_string(), "PEGI_3");
    }

    #[test]
    fn serializes_with_underscored_codes() {
        let json = serde_json::to_string(&AgeRating::Pegi12).unwrap();
        assert_eq!(json, "\"PEGI_12\"");
        for rating in AgeRating::ALL {
            assert_eq!(AgeRating::from_code(rating.as_str()), Some(rating));
        }
    }
}
