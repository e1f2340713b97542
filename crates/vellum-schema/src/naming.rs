//! Name derivation for tables, columns, and aliases.

/// Converts a member or type name to snake case.
///
/// Acronyms stay together: `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map_or(false, |n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else if ch == '.' || ch == '-' || ch == ' ' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

/// Derives a document alias from a Rust type name.
///
/// Module paths and generic arguments are dropped, so
/// `my_app::model::AdminUser` becomes `admin_user`.
pub fn type_alias(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let last = base.rsplit("::").next().unwrap_or(base);
    to_snake_case(last)
}

/// Derives a column name from a dotted member path.
pub fn column_name(member_path: &str) -> String {
    member_path
        .split('.')
        .map(to_snake_case)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("FirstName"), "first_name");
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("Id"), "id");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("Address2Line"), "address2_line");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_type_alias() {
        assert_eq!(type_alias("vellum_test::fixtures::AdminUser"), "admin_user");
        assert_eq!(type_alias("Target"), "target");
        assert_eq!(type_alias("app::Envelope<app::Message>"), "envelope");
    }

    #[test]
    fn test_column_name_for_nested_member() {
        assert_eq!(column_name("FirstName"), "first_name");
        assert_eq!(column_name("Inner.Number"), "inner_number");
    }
}
