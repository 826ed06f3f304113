pub const UNKNOWN: &str = "Unknown";

/// Subject token → stored country, checked in order.
const COUNTRIES: &[(&str, &str)] = &[
    ("Canada", "Canada"),
    ("United States of America", "US"),
];

/// Subject token → stored product, checked in order.
const PRODUCTS: &[(&str, &str)] = &[
    ("SEM VO", "Virtual Office"),
    ("SEM OF", "Office"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectClass {
    pub country: &'static str,
    pub product: &'static str,
}

pub fn classify_subject(subject: &str) -> SubjectClass {
    SubjectClass {
        country: first_match(subject, COUNTRIES),
        product: first_match(subject, PRODUCTS),
    }
}

fn first_match(subject: &str, vocabulary: &[(&str, &'static str)]) -> &'static str {
    vocabulary
        .iter()
        .find(|(token, _)| subject.contains(token))
        .map(|(_, value)| *value)
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_subject() {
        assert_eq!(
            classify_subject("Random newsletter"),
            SubjectClass { country: UNKNOWN, product: UNKNOWN }
        );
        assert_eq!(classify_subject(""), SubjectClass { country: UNKNOWN, product: UNKNOWN });
    }

    #[test]
    fn country_and_product_are_independent() {
        let c = classify_subject("Web Form Fill - Canada - SEM VO");
        assert_eq!(c.country, "Canada");
        assert_eq!(c.product, "Virtual Office");

        let c = classify_subject("Web Form Fill - United States of America");
        assert_eq!(c.country, "US");
        assert_eq!(c.product, UNKNOWN);

        let c = classify_subject("SEM OF enquiry");
        assert_eq!(c.country, UNKNOWN);
        assert_eq!(c.product, "Office");
    }

    #[test]
    fn first_listed_token_wins() {
        let c = classify_subject("Canada / United States of America - SEM OF / SEM VO");
        assert_eq!(c.country, "Canada");
        assert_eq!(c.product, "Virtual Office");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(classify_subject("canada sem vo").country, UNKNOWN);
    }
}
