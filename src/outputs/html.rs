use crate::models::SummaryRecord;
use std::fmt::{self, Write};

const STYLE: &str = "
    body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }
    h1 { color: #2c3e50; }
    .article { border: 1px solid #ddd; border-radius: 5px; padding: 15px; margin-bottom: 20px; }
    .article h2 { margin-top: 0; }
    .article img { max-width: 100%; height: auto; }
    .article a { color: #3498db; text-decoration: none; }
    .article a:hover { text-decoration: underline; }
";

/// Full display page for `records`, in the order given.
pub fn render_page(records: &[SummaryRecord]) -> String {
    let mut html = String::with_capacity(2048 + records.len() * 1024);
    // fmt::Write into a String only fails if a Display impl does.
    let _ = write_page(&mut html, records);
    html
}

fn write_page(out: &mut String, records: &[SummaryRecord]) -> fmt::Result {
    writeln!(out, "<!doctype html>")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\">")?;
    writeln!(out, "<title>GamerNews</title>")?;
    writeln!(out, "<style>{STYLE}</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body class=\"container\">")?;
    writeln!(out, "<h1>AI Summarised Eurogamer News</h1>")?;
    writeln!(out, "<p>Front-page news articles summarised hourly.</p>")?;
    for record in records {
        write_article(out, record)?;
    }
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

fn write_article(out: &mut String, record: &SummaryRecord) -> fmt::Result {
    writeln!(out, "<div class=\"article\">")?;
    writeln!(
        out,
        "<h2><a href=\"{}\">{}</a></h2>",
        escape_html(&record.url),
        escape_html(&record.title)
    )?;
    if let Some(image_url) = &record.image_url {
        writeln!(out, "<img src=\"{}\">", escape_html(image_url))?;
    }
    writeln!(out, "<p>{}</p>", escape_html(&record.summary))?;
    writeln!(out, "</div>")
}

/// Escape for both text content and double-quoted attribute values.
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(url: &str, title: &str, image_url: Option<&str>) -> SummaryRecord {
        SummaryRecord {
            url: url.to_string(),
            title: title.to_string(),
            summary: format!("Summary of {title}"),
            image_url: image_url.map(str::to_string),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_page_shell() {
        let html = render_page(&[]);
        assert!(html.contains("<title>GamerNews</title>"));
        assert!(html.contains("<h1>AI Summarised Eurogamer News</h1>"));
        assert!(html.contains("<p>Front-page news articles summarised hourly.</p>"));
        assert!(html.contains(".article img { max-width: 100%; height: auto; }"));
        assert!(!html.contains("class=\"article\""));
    }

    #[test]
    fn test_render_page_articles_in_order() {
        let html = render_page(&[
            record("https://e.net/new", "Newest", Some("https://img.e.net/n.jpg")),
            record("https://e.net/old", "Oldest", None),
        ]);
        assert_eq!(html.matches("<div class=\"article\">").count(), 2);
        assert_eq!(html.matches("<img ").count(), 1);
        assert!(html.contains("<h2><a href=\"https://e.net/new\">Newest</a></h2>"));
        assert!(html.contains("<img src=\"https://img.e.net/n.jpg\">"));
        assert!(html.find("Newest").unwrap() < html.find("Oldest").unwrap());
    }

    #[test]
    fn test_render_page_escapes_content() {
        let html = render_page(&[record(
            "https://e.net/a?x=1&y=\"2\"",
            "<script>alert('x')</script>",
            Some("https://img.e.net/a.jpg\" onerror=\"alert(1)"),
        )]);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(html.contains("href=\"https://e.net/a?x=1&amp;y=&quot;2&quot;\""));
        assert!(html.contains("src=\"https://img.e.net/a.jpg&quot; onerror=&quot;alert(1)\""));
    }

    #[test]
    fn test_escape_html_plain_text_unchanged() {
        assert_eq!(escape_html("Elden Ring DLC"), "Elden Ring DLC");
        assert_eq!(escape_html("Tom & Jerry"), "Tom &amp; Jerry");
    }
}
