use ammonia;

/// Clean user-supplied rich text (question prompts, explanations, profile
/// "about" blurbs) using the ammonia whitelist.
///
/// Safe formatting tags such as <b>, <p> and <code> survive; <script>,
/// <iframe> and event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Applies [`clean_html`] to an optional field.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(clean_html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_removed() {
        let cleaned = clean_html("<p>2 + 2 = ?</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>2 + 2 = ?</p>");
    }

    #[test]
    fn test_optional_passthrough() {
        assert_eq!(clean_optional(None), None);
        assert_eq!(clean_optional(Some("<b>x</b>")), Some("<b>x</b>".to_string()));
    }
}
