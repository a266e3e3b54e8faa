//! Centralized parameter naming so that a bound value and its `$name` reference never drift apart.
//!
//! **Every** placeholder emitted by the clause compiler is derived here.
//!
//! ## Naming Convention
//! Format: `{sanitized_column}_{clause_index}` or `{sanitized_column}_{clause_index}_{suffix}`
//! - `.`, `->` and spaces become `_`
//! - any other character that is not valid in a Cypher parameter name is dropped
//! - names that would start with a digit get a `p_` prefix
//!
//! Examples:
//! - `("age", 0)` → `"age_0"`
//! - `("users.email", 2)` → `"users_email_2"`
//! - `("settings->theme", 1, "length")` → `"settings_theme_1_length"`

/// Reduce a column reference to the characters allowed in a parameter name.
///
/// # Examples
/// ```
/// use neoquent::utils::param_naming::sanitize_column;
///
/// assert_eq!(sanitize_column("age"), "age");
/// assert_eq!(sanitize_column("users.email"), "users_email");
/// assert_eq!(sanitize_column("settings->theme"), "settings_theme");
/// assert_eq!(sanitize_column("first name"), "first_name");
/// assert_eq!(sanitize_column("2fa"), "p_2fa");
/// assert_eq!(sanitize_column(""), "param");
/// ```
pub fn sanitize_column(column: &str) -> String {
    let replaced = column.replace("->", "_").replace(['.', ' '], "_");
    let cleaned: String = replaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if cleaned.is_empty() {
        "param".to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("p_{}", cleaned)
    } else {
        cleaned
    }
}

/// Generate a parameter name for a clause.
///
/// # Examples
/// ```
/// use neoquent::utils::param_naming::generate_param_name;
///
/// assert_eq!(generate_param_name("age", 0), "age_0");
/// assert_eq!(generate_param_name("users.email", 2), "users_email_2");
/// ```
pub fn generate_param_name(column: &str, index: usize) -> String {
    format!("{}_{}", sanitize_column(column), index)
}

/// Generate a parameter name carrying a type-specific suffix (`min`, `max`, `in`, `notin`,
/// `length`, `json`).
///
/// # Examples
/// ```
/// use neoquent::utils::param_naming::generate_suffixed_param_name;
///
/// assert_eq!(generate_suffixed_param_name("age", 3, "min"), "age_3_min");
/// assert_eq!(
///     generate_suffixed_param_name("settings->theme", 1, "length"),
///     "settings_theme_1_length"
/// );
/// ```
pub fn generate_suffixed_param_name(column: &str, index: usize, suffix: &str) -> String {
    format!("{}_{}_{}", sanitize_column(column), index, suffix)
}
