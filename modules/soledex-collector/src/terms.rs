//! Curated search-term catalog driving the worklist. Configuration as
//! data: broad coverage across brands, model lines and the collab
//! releases that dominate resale catalogs.

/// Search terms for the metadata collection phase.
pub fn search_terms() -> Vec<&'static str> {
    vec![
        // Nike
        "Nike Air Jordan 1",
        "Nike Air Jordan 3",
        "Nike Air Jordan 4",
        "Nike Air Jordan 11",
        "Nike Air Max 1",
        "Nike Air Max 90",
        "Nike Air Max 97",
        "Nike Air Force 1",
        "Nike Dunk Low",
        "Nike Dunk High",
        "Nike SB Dunk",
        "Nike Blazer",
        "Nike Cortez",
        "Nike Air Presto",
        // Adidas
        "Adidas Yeezy 350",
        "Adidas Yeezy 500",
        "Adidas Yeezy 700",
        "Adidas Ultraboost",
        "Adidas NMD",
        "Adidas Stan Smith",
        "Adidas Superstar",
        "Adidas Gazelle",
        "Adidas Forum",
        "Adidas Samba",
        // Other brands
        "New Balance 550",
        "New Balance 990",
        "New Balance 2002R",
        "New Balance 327",
        "Converse Chuck Taylor",
        "Converse One Star",
        "Vans Old Skool",
        "Vans Sk8-Hi",
        "Puma Suede",
        "Puma RS-X",
        "Reebok Classic",
        "Asics Gel-Lyte",
        // Collabs and limited editions
        "Travis Scott Jordan",
        "Off-White Nike",
        "Fragment Jordan",
        "Union Jordan",
        "Supreme Nike",
        "Stussy Nike",
        "Chicago Jordan",
        "Bred Jordan",
        "Shattered Backboard",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_unique() {
        let terms = search_terms();
        let mut deduped = terms.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(terms.len(), deduped.len());
    }
}
