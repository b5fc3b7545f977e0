/// Clean user-supplied text using the ammonia library.
///
/// Whitelist-based: safe formatting tags (like <b>, <p>) survive while
/// <script>, <iframe> and event-handler attributes are removed, including the
/// content of <script>. Quiz descriptions, question text and explanations go through
/// this before they are stored, since they are rendered to other users.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

pub fn clean_opt(input: Option<String>) -> Option<String> {
    input.map(|s| clean_html(&s))
}

/// Plain-text fields (titles, group names): every tag is stripped and the
/// result is stored unescaped, so "R&D" stays "R&D".
pub fn clean_text(input: &str) -> String {
    ammonia::Builder::empty()
        .clean(input)
        .to_string()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_keeps_formatting() {
        let cleaned = clean_html("<b>Bold</b><script>alert(1)</script>");
        assert_eq!(cleaned, "<b>Bold</b>");
    }

    #[test]
    fn test_clean_text_keeps_ampersands() {
        assert_eq!(clean_text("R&D"), "R&D");
        assert_eq!(clean_text(" <b>Year 9</b> & <i>10</i> "), "Year 9 & 10");
        assert_eq!(clean_text("a < b"), "a < b");
        assert_eq!(clean_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_clean_opt() {
        assert_eq!(clean_opt(None), None);
        assert_eq!(clean_opt(Some("plain".to_string())), Some("plain".to_string()));
    }
}
