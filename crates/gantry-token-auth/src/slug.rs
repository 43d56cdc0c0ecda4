//! Username slugification.
//!
//! Usernames asserted by identity providers are free-form; local usernames
//! must be unique slugs. Collision adjustment (numeric-suffix probing)
//! happens in the Membership Resolver against storage.

/// Slugifies a username: lowercase ASCII alphanumerics with single `-`
/// separators, leading/trailing separators trimmed.
///
/// Returns `"user"` when nothing usable remains, so a slug is never empty.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_sep = true;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

/// Builds the `n`-th collision candidate for a slug: `slug`, `slug-1`,
/// `slug-2`, ...
#[must_use]
pub fn candidate(slug: &str, n: u32) -> String {
    if n == 0 {
        slug.to_string()
    } else {
        format!("{slug}-{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("jdoe"), "jdoe");
        assert_eq!(slugify("Jane Doe"), "jane-doe");
        assert_eq!(slugify("jane.doe@corp"), "jane-doe-corp");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("jane---doe"), "jane-doe");
        assert_eq!(slugify("  jane  "), "jane");
        assert_eq!(slugify("__jane__doe__"), "jane-doe");
    }

    #[test]
    fn test_slugify_strips_non_ascii() {
        assert_eq!(slugify("Jöhn Düe"), "j-hn-d-e");
    }

    #[test]
    fn test_slugify_never_empty() {
        assert_eq!(slugify(""), "user");
        assert_eq!(slugify("!!!"), "user");
    }

    #[test]
    fn test_candidate_sequence() {
        assert_eq!(candidate("jdoe", 0), "jdoe");
        assert_eq!(candidate("jdoe", 1), "jdoe-1");
        assert_eq!(candidate("jdoe", 7), "jdoe-7");
    }
}
