//! Name/key normalization and the field-extraction helpers shared by
//! source adapters. Extraction is table-driven and deliberately
//! conservative: a miss returns `None`, it never invents a value.

/// Normalize a name or brand for dedup comparison: lowercase, trim, and
/// collapse internal whitespace.
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a SKU / style code. Style codes appear with and without
/// dashes and spaces across sources ("DD1391-100" vs "DD1391 100"), so
/// separators are stripped entirely.
pub fn sku_key(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

/// Token-containment check between two already-normalized names.
/// Deliberately shallow: source names of the same product differ mostly
/// by appended colorway/edition words, so substring containment either
/// way is the documented fuzzy-match behavior.
pub fn name_contains(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a)
}

/// Strip tracking parameters that cause dedup mismatches between
/// otherwise identical image URLs.
pub fn sanitize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid", "gclid", "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
        "ref", "mc_cid", "mc_eid",
    ];

    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return url.to_string();
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    parsed.to_string()
}

const BRANDS: &[(&str, &[&str])] = &[
    ("Nike", &["nike", "air jordan", "jordan"]),
    ("Adidas", &["adidas", "yeezy"]),
    ("New Balance", &["new balance"]),
    ("Converse", &["converse"]),
    ("Vans", &["vans"]),
    ("Puma", &["puma"]),
    ("Reebok", &["reebok"]),
    ("Asics", &["asics"]),
];

// More specific entries first: "Air Jordan 11" must win over
// "Air Jordan 1" on containment.
const MODELS: &[&str] = &[
    "Air Jordan 11",
    "Air Jordan 4",
    "Air Jordan 3",
    "Air Jordan 1",
    "Air Max 90",
    "Air Max 97",
    "Air Max 1",
    "Air Force 1",
    "Dunk Low",
    "Dunk High",
    "Blazer",
    "Yeezy Boost 350",
    "Yeezy 350",
    "Yeezy 500",
    "Yeezy 700",
    "Ultraboost",
    "NMD",
    "Stan Smith",
    "Superstar",
    "Gazelle",
    "Chuck Taylor",
    "Old Skool",
    "550",
    "990",
    "2002R",
];

/// Extract a known brand from a product name.
pub fn extract_brand(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    BRANDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(brand, _)| (*brand).to_string())
}

/// Extract a known model line from a product name.
pub fn extract_model(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    MODELS
        .iter()
        .find(|m| lower.contains(&m.to_lowercase()))
        .map(|m| (*m).to_string())
}

const COLOR_WORDS: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "grey", "gray", "brown", "pink", "purple",
    "orange", "bred", "chicago", "royal", "shadow",
];

/// Extract a colorway from a product name: a quoted segment when present,
/// otherwise trailing color words.
pub fn extract_colorway(name: &str) -> Option<String> {
    if let Some(start) = name.find('"') {
        if let Some(len) = name[start + 1..].find('"') {
            let quoted = &name[start + 1..start + 1 + len];
            if !quoted.is_empty() {
                return Some(quoted.to_string());
            }
        }
    }

    let words: Vec<&str> = name.split_whitespace().collect();
    let mut colorway: Vec<String> = Vec::new();
    for word in words.iter().rev() {
        let lower = word.to_lowercase();
        if COLOR_WORDS.iter().any(|c| lower.contains(c)) {
            colorway.insert(0, capitalize(&lower));
        } else {
            break;
        }
    }

    if colorway.is_empty() {
        None
    } else {
        Some(colorway.join(" "))
    }
}

/// Parse a price out of display text like "$189" or "189.99 USD".
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|p| *p > 0.0)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_key("  Air  Jordan\t1  "), "air jordan 1");
    }

    #[test]
    fn sku_key_strips_separators() {
        assert_eq!(sku_key("DD1391-100"), "dd1391100");
        assert_eq!(sku_key("dd1391 100"), "dd1391100");
    }

    #[test]
    fn containment_is_symmetric_and_rejects_empty() {
        assert!(name_contains("air jordan 1 high og", "air jordan 1"));
        assert!(name_contains("air jordan 1", "air jordan 1 high og"));
        assert!(!name_contains("", "air jordan 1"));
        assert!(!name_contains("dunk low", "air jordan 1"));
    }

    #[test]
    fn sanitize_url_strips_tracking_params() {
        let url = "https://img.example.com/shoe.jpg?w=800&utm_source=feed&fbclid=abc";
        assert_eq!(sanitize_url(url), "https://img.example.com/shoe.jpg?w=800");
    }

    #[test]
    fn sanitize_url_passes_through_clean_urls() {
        let url = "https://img.example.com/shoe.jpg";
        assert_eq!(sanitize_url(url), url);
    }

    #[test]
    fn brand_extraction_recognizes_sub_brands() {
        assert_eq!(extract_brand("Air Jordan 1 Retro High"), Some("Nike".to_string()));
        assert_eq!(extract_brand("Yeezy Boost 350 V2"), Some("Adidas".to_string()));
        assert_eq!(extract_brand("Some Unknown Runner"), None);
    }

    #[test]
    fn model_extraction_prefers_most_specific_entry() {
        assert_eq!(
            extract_model("Air Jordan 11 Concord"),
            Some("Air Jordan 11".to_string())
        );
        assert_eq!(
            extract_model("Yeezy Boost 350 V2 Zebra"),
            Some("Yeezy Boost 350".to_string())
        );
        assert_eq!(extract_model("Some Unknown Runner"), None);
    }

    #[test]
    fn colorway_prefers_quoted_segment() {
        assert_eq!(
            extract_colorway("Air Jordan 1 \"Shattered Backboard\""),
            Some("Shattered Backboard".to_string())
        );
        assert_eq!(
            extract_colorway("Nike Dunk Low Black White"),
            Some("Black White".to_string())
        );
        assert_eq!(extract_colorway("Nike Dunk Low"), None);
    }

    #[test]
    fn price_parsing_handles_currency_text() {
        assert_eq!(parse_price("$189"), Some(189.0));
        assert_eq!(parse_price("189.99 USD"), Some(189.99));
        assert_eq!(parse_price("--"), None);
    }
}
