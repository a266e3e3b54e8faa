//! SQL-style operator tokens and their Cypher spellings.
//!
//! `convert` is the total mapping used when an operator is emitted verbatim. `Operator::parse`
//! is the whitelist: clause compilers only accept tokens it recognizes, since the token ends up
//! in query text.

use std::fmt;

/// Map a SQL-style operator token to its Cypher equivalent.
///
/// Unknown tokens are returned unchanged. `LIKE` maps to `CONTAINS` here, but the clause
/// compiler handles LIKE through its own branch so that `%` wildcards can be stripped.
///
/// # Examples
/// ```
/// use neoquent::cypher_generator::operators::convert;
///
/// assert_eq!(convert("!="), "<>");
/// assert_eq!(convert("like"), "CONTAINS");
/// assert_eq!(convert(">="), ">=");
/// assert_eq!(convert("<=>"), "<=>");
/// ```
pub fn convert(operator: &str) -> String {
    match Operator::parse(operator) {
        Some(op) => op.as_cypher().to_string(),
        None => operator.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
    Like,
    NotLike,
    In,
    NotIn,
    StartsWith,
    EndsWith,
    Contains,
    Regex,
}

impl Operator {
    /// Parse an operator token, case- and whitespace-insensitive.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let op = match normalized.as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Lte,
            ">=" => Operator::Gte,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "starts with" => Operator::StartsWith,
            "ends with" => Operator::EndsWith,
            "contains" => Operator::Contains,
            "=~" | "regexp" => Operator::Regex,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_cypher(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Like => "CONTAINS",
            Operator::NotLike => "NOT CONTAINS",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::Contains => "CONTAINS",
            Operator::Regex => "=~",
        }
    }

    /// Plain ordering/equality comparisons.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::Gt
                | Operator::Lte
                | Operator::Gte
        )
    }

    /// Operators that can sit between two property references.
    pub fn is_column_operator(&self) -> bool {
        self.is_comparison()
            || matches!(
                self,
                Operator::StartsWith | Operator::EndsWith | Operator::Contains
            )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cypher())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("=", "=" ; "equals")]
    #[test_case("!=", "<>" ; "bang not equals")]
    #[test_case("<>", "<>" ; "sql not equals")]
    #[test_case("<", "<" ; "less than")]
    #[test_case(">=", ">=" ; "greater or equal")]
    #[test_case("LIKE", "CONTAINS" ; "like upper")]
    #[test_case("not   like", "NOT CONTAINS" ; "not like spaced")]
    #[test_case("Starts With", "STARTS WITH" ; "starts with mixed case")]
    #[test_case("regexp", "=~" ; "regexp")]
    fn test_convert_known(input: &str, expected: &str) {
        assert_eq!(convert(input), expected);
    }

    #[test_case("<=>" ; "null safe equals")]
    #[test_case("&" ; "bitwise and")]
    #[test_case("sounds like" ; "sounds like")]
    fn test_convert_unknown_passes_through(input: &str) {
        assert_eq!(convert(input), input);
        assert_eq!(convert(input), convert(input));
    }

    #[test]
    fn test_parse_rejects_injection() {
        assert_eq!(Operator::parse("= 1 OR 1 ="), None);
        assert_eq!(Operator::parse(""), None);
    }

    #[test]
    fn test_column_operators() {
        assert!(Operator::Gte.is_column_operator());
        assert!(Operator::StartsWith.is_column_operator());
        assert!(!Operator::In.is_column_operator());
        assert!(!Operator::Like.is_comparison());
    }
}
