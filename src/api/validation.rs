use tracing::warn;

/// Parses a boolean form field. Accepts the same spellings as Go's
/// `strconv.ParseBool`; anything else is logged and read as `false`.
pub fn parse_form_bool(field: &str, value: &str) -> bool {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => true,
        "0" | "f" | "F" | "FALSE" | "false" | "False" => false,
        other => {
            warn!("Invalid value for {field}: {other:?}, using false");
            false
        }
    }
}

/// Parses a user id form field. Unparsable ids are logged and yield `None`,
/// which callers treat as "no such user".
pub fn parse_user_id(value: &str) -> Option<i32> {
    match value.trim().parse::<i32>() {
        Ok(id) if id > 0 => Some(id),
        Ok(id) => {
            warn!("Invalid user id: {id}");
            None
        }
        Err(e) => {
            warn!("Invalid user id {value:?}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_bool_accepts_go_spellings() {
        for value in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(parse_form_bool("admin", value), "{value}");
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(!parse_form_bool("admin", value), "{value}");
        }
    }

    #[test]
    fn test_parse_form_bool_defaults_to_false() {
        assert!(!parse_form_bool("admin", ""));
        assert!(!parse_form_bool("admin", "on"));
        assert!(!parse_form_bool("admin", "yes"));
        assert!(!parse_form_bool("admin", "tRuE"));
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("1"), Some(1));
        assert_eq!(parse_user_id(" 42 "), Some(42));
        assert_eq!(parse_user_id(""), None);
        assert_eq!(parse_user_id("abc"), None);
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("-3"), None);
    }
}
