/// Derives a URL-safe slug from a collection title.
///
/// Lowercases the input, replaces every run of non-alphanumeric characters
/// with a single `-`, and trims separators from both ends. The result is
/// deterministic but not guaranteed unique across siblings.
///
/// # Examples
///
/// ```
/// use roost::util::slugify;
///
/// assert_eq!(slugify("Hacker News"), "hacker-news");
/// assert_eq!(slugify("  Rust -- Weekly!  "), "rust-weekly");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_separator = true;
        }
    }

    slug
}
