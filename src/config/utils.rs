/// Parse a boolean value from a string
///
/// Accepts the common truthy/falsy spellings used in environment variables.
/// Returns `None` for unrecognized values so callers can apply their own default.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma-separated list of CORS origins
///
/// Whitespace around entries is trimmed and empty entries are dropped.
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_truthy() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
    }

    #[test]
    fn test_parse_bool_falsy() {
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://a.com, http://b.com"),
            vec!["http://a.com".to_string(), "http://b.com".to_string()]
        );
        assert_eq!(parse_origins("*"), vec!["*".to_string()]);
        assert_eq!(parse_origins(" , "), Vec::<String>::new());
    }
}
