/// Text longer than this is treated as volatile content and fingerprinted.
pub const VOLATILE_TEXT_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Stable,
    Volatile,
}

/// Normalize free text for use as an attribute value.
///
/// Collapses whitespace and lowercases. Long text is replaced by a short
/// SHA-1 fingerprint so keys stay compact while remaining discriminating.
pub fn normalize_text(raw: &str) -> Option<String> {
    let normalized = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if normalized.is_empty() {
        return None;
    }

    match classify_volatility(&normalized) {
        Volatility::Stable => Some(normalized),
        Volatility::Volatile => Some(format!("#{}", &text_fingerprint(&normalized)[..12])),
    }
}

pub fn classify_volatility(text: &str) -> Volatility {
    if text.chars().count() > VOLATILE_TEXT_LEN {
        Volatility::Volatile
    } else {
        Volatility::Stable
    }
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short class name: `android.widget.Button` -> `Button`.
pub fn simple_class_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_text("  Sign   In "), Some("sign in".into()));
        assert_eq!(normalize_text("   "), None);
    }

    #[test]
    fn long_text_is_fingerprinted() {
        let long = "lorem ipsum ".repeat(20);
        let normalized = normalize_text(&long).unwrap();
        assert!(normalized.starts_with('#'));
        assert_eq!(normalized.len(), 13);
        assert_eq!(normalize_text(&long), Some(normalized), "fingerprint is stable");
    }

    #[test]
    fn simple_class_name_strips_package() {
        assert_eq!(simple_class_name("android.widget.Button"), "Button");
        assert_eq!(simple_class_name("Button"), "Button");
    }
}
