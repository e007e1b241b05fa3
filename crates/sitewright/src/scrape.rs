//! Best-effort analysis of a client's existing site.
//!
//! Fetches the page, strips markup, and returns a bounded plain-text
//! summary for the Strategist's context. Every failure collapses to an
//! empty analysis; this stage can never hold up a build.

use std::time::Duration;

use tracing::debug;

/// Upper bound on analysis text passed into prompts.
const MAX_ANALYSIS_CHARS: usize = 4000;

/// Fetch and summarize an existing site. Returns `None` on any failure.
pub async fn analyze_existing_site(url: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .ok()?;

    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        debug!(url, status = %response.status(), "existing site fetch not ok");
        return None;
    }
    let body = response.text().await.ok()?;
    let text = strip_markup(&body);
    if text.trim().is_empty() {
        return None;
    }

    let mut out = text;
    if out.len() > MAX_ANALYSIS_CHARS {
        let mut cut = MAX_ANALYSIS_CHARS;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    Some(out)
}

/// Drop tags, scripts, and styles; collapse whitespace runs.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 4);
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;
    let lower = html.to_ascii_lowercase();
    let mut i = 0;
    let bytes = html.as_bytes();

    while i < bytes.len() {
        if let Some(end_tag) = skip_until {
            if lower[i..].starts_with(end_tag) {
                i += end_tag.len();
                skip_until = None;
            } else {
                i += 1;
            }
            continue;
        }
        match bytes[i] {
            b'<' => {
                if lower[i..].starts_with("<script") {
                    skip_until = Some("</script>");
                } else if lower[i..].starts_with("<style") {
                    skip_until = Some("</style>");
                } else {
                    in_tag = true;
                }
                i += 1;
            }
            b'>' => {
                in_tag = false;
                out.push(' ');
                i += 1;
            }
            _ if in_tag => i += 1,
            _ => {
                let c = html[i..].chars().next().unwrap_or(' ');
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup_basic() {
        let html = "<html><head><style>body{color:red}</style></head>\
<body><h1>Sunrise   Bakery</h1><p>Fresh bread daily.</p>\
<script>track()</script></body></html>";
        assert_eq!(strip_markup(html), "Sunrise Bakery Fresh bread daily.");
    }

    #[test]
    fn test_strip_markup_plain_text_passthrough() {
        assert_eq!(strip_markup("just words"), "just words");
    }
}
