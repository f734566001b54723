/// Prompt composition and the fixed transcript message templates.

/// Build the prompt sent upstream. Without a quote this is `raw_query`
/// verbatim; with one, the quote becomes a blockquoted context section
/// followed by the question.
pub fn compose(raw_query: &str, pending_quote: Option<&str>) -> String {
    match pending_quote.filter(|q| !q.is_empty()) {
        None => raw_query.to_string(),
        Some(quote) => format!(
            "Context:\n> {}\n\nQuestion:\n{raw_query}",
            quote.replace('\n', "\n> ")
        ),
    }
}

/// First message of a fresh transcript after a successful load.
pub fn analysis_complete(summary: &str) -> String {
    format!("**Repository Analysis Complete.**\n\n{summary}")
}

/// Appended after a forced re-index.
pub fn updated_analysis(summary: &str) -> String {
    format!("**Updated Analysis.**\n\n{summary}")
}

/// Bot-authored notice for a failed chat call.
pub fn error_notice(message: &str) -> String {
    format!("**Error:** {message}")
}
