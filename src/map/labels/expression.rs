use crate::map::feature::Feature;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Field(String),
}

/// Label text template. `[FIELD]` tokens are replaced by the feature's
/// attribute value; everything else is copied through. An unterminated `[`
/// is kept as literal text.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelExpression {
    source: String,
    tokens: Vec<Token>,
}

impl LabelExpression {
    pub fn parse(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                break;
            };
            literal.push_str(&rest[..open]);
            let field = after[..close].trim();
            if field.is_empty() {
                literal.push_str("[]");
            } else {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Field(field.to_string()));
            }
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Self {
            source: source.to_string(),
            tokens,
        }
    }

    /// Shorthand for the common `[FIELD]` expression
    pub fn field(name: &str) -> Self {
        Self::parse(&format!("[{name}]"))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced by the template, in order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Field(f) => Some(f.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Substitute attribute values. Missing fields become empty strings.
    pub fn evaluate(&self, feature: &Feature) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Field(f) => {
                    if let Some(v) = feature.attribute(f) {
                        out.push_str(&v.to_string());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::geometry::Geometry;

    fn paris() -> Feature {
        Feature::new(1, Geometry::point(2.35, 48.85))
            .with("NAME", "Paris")
            .with("POP", 2_148_000.0)
    }

    #[test]
    fn test_substitutes_fields() {
        let e = LabelExpression::parse("[NAME] ([POP])");
        assert_eq!(e.evaluate(&paris()), "Paris (2148000)");
        assert_eq!(e.fields().collect::<Vec<_>>(), vec!["NAME", "POP"]);
    }

    #[test]
    fn test_missing_field_is_empty() {
        let e = LabelExpression::parse("City: [MISSING]");
        assert_eq!(e.evaluate(&paris()), "City: ");
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        let e = LabelExpression::parse("[NAME] [oops");
        assert_eq!(e.evaluate(&paris()), "Paris [oops");
        assert_eq!(LabelExpression::parse("[]x").evaluate(&paris()), "[]x");
    }

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        assert_eq!(LabelExpression::field("name").evaluate(&paris()), "Paris");
    }
}
