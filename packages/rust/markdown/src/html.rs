//! Rendered-HTML to markdown conversion.
//!
//! Takes the serialized DOM of a rendered documentation page and produces
//! clean markdown: chrome stripped, `<main>`/`<article>` preferred as the
//! content root, ATX headings, hyphen bullets.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use docsync_shared::{DocsyncError, Result};

/// Tags dropped wholesale before conversion.
const SKIP_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "svg"];

/// Convert a rendered HTML fragment to clean markdown.
pub fn convert_html(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| DocsyncError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw.len(), "html conversion complete");

    let cleaned = hyphen_bullets(&raw);
    let cleaned = drop_empty_links(&cleaned);
    let cleaned = collapse_newlines(&cleaned);

    Ok(format!("{}\n", cleaned.trim()))
}

/// Prefer `<main>` or `<article>` as the content root, else the whole body.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel_str in ["main", "article", "body"] {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Convert HTML `<table>` elements to markdown table syntax before htmd
/// conversion; `htmd` 0.1 does not convert tables.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").expect("valid selector");

    if doc.select(&table_sel).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&table_sel) {
        let table_html = table_el.html();
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_html, &md_table, 1);
    }

    result
}

/// Render a single HTML table element as a markdown table string.
fn html_table_to_markdown(table: &scraper::ElementRef) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let th_sel = Selector::parse("th").expect("valid selector");
    let td_sel = Selector::parse("td").expect("valid selector");

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&tr_sel) {
        let ths: Vec<String> = tr
            .select(&th_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !ths.is_empty() {
            has_header = true;
            rows.push(ths);
            continue;
        }

        let tds: Vec<String> = tr
            .select(&td_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !tds.is_empty() {
            rows.push(tds);
        }
    }

    if rows.is_empty() {
        return String::new();
    }

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        while row.len() < col_count {
            row.push(String::new());
        }
    }

    let mut md = String::from("\n\n");

    md.push_str("| ");
    md.push_str(&rows[0].join(" | "));
    md.push_str(" |\n");

    md.push_str("| ");
    md.push_str(&vec!["---"; col_count].join(" | "));
    md.push_str(" |\n");

    let data_start = usize::from(has_header);
    for row in &rows[data_start..] {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
    }

    md.push('\n');
    md
}

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\s*)[*+] ").expect("valid regex"));

/// Normalize unordered-list markers to hyphens.
fn hyphen_bullets(md: &str) -> String {
    BULLET_RE.replace_all(md, "$1- ").to_string()
}

static EMPTY_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\]\([^)]*\)").expect("valid regex"));

/// Drop links whose text is empty — icon anchors and skip-links render as
/// `[](…)` noise.
fn drop_empty_links(md: &str) -> String {
    EMPTY_LINK_RE.replace_all(md, "").to_string()
}

static MULTI_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Collapse runs of three or more newlines to exactly two.
fn collapse_newlines(md: &str) -> String {
    MULTI_NEWLINE_RE.replace_all(md, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_main_content() {
        let html = "<html><body><nav><a href=\"/\">Home</a></nav><main><h1>Models</h1><p>Available models.</p></main><footer>© docs</footer></body></html>";
        let md = convert_html(html).unwrap();

        assert!(md.contains("# Models"));
        assert!(md.contains("Available models."));
        assert!(!md.contains("Home"));
        assert!(!md.contains("© docs"));
    }

    #[test]
    fn prefers_article_over_body() {
        let html = "<html><body><p>outside</p><article><h2>Inside</h2></article></body></html>";
        let md = convert_html(html).unwrap();
        assert!(md.contains("## Inside"));
        assert!(!md.contains("outside"));
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><h1>Plain</h1><p>No semantic root.</p></body></html>";
        let md = convert_html(html).unwrap();
        assert!(md.contains("# Plain"));
        assert!(md.contains("No semantic root."));
    }

    #[test]
    fn strips_script_and_style() {
        let html = "<html><body><main><p>Keep</p><script>alert(1)</script><style>.x{}</style></main></body></html>";
        let md = convert_html(html).unwrap();
        assert!(md.contains("Keep"));
        assert!(!md.contains("alert"));
        assert!(!md.contains(".x{}"));
    }

    #[test]
    fn lists_use_hyphen_bullets() {
        let html = "<html><body><main><ul><li>alpha</li><li>beta</li></ul></main></body></html>";
        let md = convert_html(html).unwrap();
        assert!(md.contains("- alpha"));
        assert!(md.contains("- beta"));
    }

    #[test]
    fn empty_links_dropped() {
        let html = r##"<html><body><main><p><a href="#main"></a>Pricing <a href="/models">table</a></p></main></body></html>"##;
        let md = convert_html(html).unwrap();
        assert!(!md.contains("[](#main)"));
        assert!(md.contains("[table](/models)"));
    }

    #[test]
    fn tables_become_markdown_tables() {
        let html = r#"<html><body><main>
            <h1>Models</h1>
            <table>
                <thead><tr><th>Model</th><th>Context</th></tr></thead>
                <tbody>
                    <tr><td>default</td><td>32k</td></tr>
                    <tr><td>large</td><td>128k</td></tr>
                </tbody>
            </table>
        </main></body></html>"#;

        let md = convert_html(html).unwrap();
        assert!(md.contains("| Model | Context |"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| default | 32k |"));
        assert!(md.contains("| large | 128k |"));
    }

    #[test]
    fn newline_runs_collapsed() {
        let html = "<html><body><main><h1>A</h1><div></div><div></div><div></div><p>B</p></main></body></html>";
        let md = convert_html(html).unwrap();
        assert!(!md.contains("\n\n\n"));
    }
}
