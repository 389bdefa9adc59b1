//! Extended-markdown (inline component) lowering.
//!
//! The docs repo authors pages in markdown augmented with XML-like inline
//! components (`<Note>`, `<Steps>`, `<Card …>`, …). This module lowers them
//! to plain markdown. Components are modeled as a tagged variant set with a
//! single dispatcher: adding a component means one enum case, not one new
//! ad-hoc regex pass.
//!
//! The only HTML retained in the output is `<details>`/`<summary>` and the
//! `<!-- PLACEHOLDER: id -->` sentinels consumed by the merger.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Prefix of the sentinel left where a rendered fragment will be injected.
pub const PLACEHOLDER_PREFIX: &str = "<!-- PLACEHOLDER: ";

/// Build the sentinel string for a placeholder id.
pub fn placeholder_sentinel(id: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{id} -->")
}

/// Result of lowering a component-markdown document.
#[derive(Debug, Clone)]
pub struct ComponentDoc {
    /// Plain markdown body.
    pub markdown: String,
    /// `title` from frontmatter, when present.
    pub title: Option<String>,
    /// `description` from frontmatter, when present.
    pub description: Option<String>,
    /// `tags` from frontmatter (list or comma-separated string).
    pub tags: Vec<String>,
}

/// Lower a component-markdown document to plain markdown.
///
/// 1. Split and parse the leading YAML frontmatter; synthesize an H1 from
///    `title` when the body has none.
/// 2. Replace placeholder divs with textual sentinels.
/// 3. Lower every component through the dispatcher until a fixed point
///    (outer wrappers expose their children to the next round).
pub fn convert_components(raw: &str) -> ComponentDoc {
    let (frontmatter, body) = split_frontmatter(raw);

    let mut markdown = lower_placeholders(body);
    markdown = lower_all(&markdown);

    let title = frontmatter.get("title").cloned();
    let description = frontmatter.get("description").cloned();
    let tags = frontmatter
        .get("tags")
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if let Some(ref t) = title {
        if !has_h1(&markdown) {
            markdown = format!("# {t}\n\n{}", markdown.trim_start());
        }
    }

    let markdown = format!("{}\n", markdown.trim_end());

    ComponentDoc {
        markdown,
        title,
        description,
        tags,
    }
}

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

static FRONTMATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---\r?\n?").expect("valid regex"));

static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^# ").expect("valid regex"));

/// Split a leading `---\n…\n---` block and flatten it to string fields.
fn split_frontmatter(raw: &str) -> (HashMap<String, String>, &str) {
    let Some(caps) = FRONTMATTER_RE.captures(raw) else {
        return (HashMap::new(), raw);
    };

    let yaml = &caps[1];
    let body = &raw[caps.get(0).map(|m| m.end()).unwrap_or(0)..];

    let mut fields = HashMap::new();
    match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(serde_yaml::Value::Mapping(map)) => {
            for (key, value) in map {
                let Some(key) = key.as_str() else { continue };
                let flat = match value {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Sequence(seq) => seq
                        .iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => continue,
                };
                fields.insert(key.to_string(), flat);
            }
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "unparseable frontmatter, continuing without metadata");
        }
    }

    (fields, body)
}

fn has_h1(markdown: &str) -> bool {
    H1_RE.is_match(markdown)
}

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

static PLACEHOLDER_DIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*\bid\s*=\s*["']([^"']*-placeholder)["'][^>]*>.*?</div>"#)
        .expect("valid regex")
});

/// Replace `<div id="*-placeholder">…</div>` with the textual sentinel the
/// merger substitutes later.
fn lower_placeholders(body: &str) -> String {
    PLACEHOLDER_DIV_RE
        .replace_all(body, |caps: &regex::Captures| placeholder_sentinel(&caps[1]))
        .to_string()
}

// ---------------------------------------------------------------------------
// Component dispatcher
// ---------------------------------------------------------------------------

/// The complete set of recognized inline components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    CodeGroup,
    Steps,
    Step,
    Note,
    Warning,
    Info,
    Tip,
    CardGroup,
    Card,
    Tabs,
    Tab,
    Accordion,
    Tooltip,
    Frame,
    Icon,
    ParamField,
    ResponseField,
}

/// Lowering order: wrappers before their children so a later fixed-point
/// round sees the exposed inner tags.
const COMPONENTS: &[Component] = &[
    Component::CodeGroup,
    Component::Steps,
    Component::Step,
    Component::Note,
    Component::Warning,
    Component::Info,
    Component::Tip,
    Component::CardGroup,
    Component::Card,
    Component::Tabs,
    Component::Tab,
    Component::Accordion,
    Component::Tooltip,
    Component::Frame,
    Component::Icon,
    Component::ParamField,
    Component::ResponseField,
];

/// Document-scoped state threaded through the dispatcher.
#[derive(Default)]
struct LowerState {
    step_counter: usize,
}

impl Component {
    fn tag(self) -> &'static str {
        match self {
            Self::CodeGroup => "CodeGroup",
            Self::Steps => "Steps",
            Self::Step => "Step",
            Self::Note => "Note",
            Self::Warning => "Warning",
            Self::Info => "Info",
            Self::Tip => "Tip",
            Self::CardGroup => "CardGroup",
            Self::Card => "Card",
            Self::Tabs => "Tabs",
            Self::Tab => "Tab",
            Self::Accordion => "Accordion",
            Self::Tooltip => "Tooltip",
            Self::Frame => "Frame",
            Self::Icon => "Icon",
            Self::ParamField => "ParamField",
            Self::ResponseField => "ResponseField",
        }
    }

    /// Lower one occurrence. `attrs` is the raw attribute string, `inner`
    /// the body (empty for self-closing forms).
    fn lower(self, attrs: &str, inner: &str, state: &mut LowerState) -> String {
        match self {
            // Wrappers: drop the tags, keep the children.
            Self::CodeGroup | Self::Steps | Self::CardGroup | Self::Tabs => {
                format!("\n{}\n", inner.trim())
            }

            Self::Step => {
                state.step_counter += 1;
                let title = attr(attrs, "title").unwrap_or_default();
                format!(
                    "\n### Step {}: {}\n\n{}\n",
                    state.step_counter,
                    title,
                    inner.trim()
                )
            }

            Self::Note => blockquote("**Note:**", inner),
            Self::Warning => blockquote("⚠️ **Warning:**", inner),
            Self::Info => blockquote("**Info:**", inner),
            Self::Tip => blockquote("**Tip:**", inner),

            Self::Card => {
                let title = attr(attrs, "title").unwrap_or_default();
                let href = attr(attrs, "href").unwrap_or_default();
                let body = inline(inner);
                if body.is_empty() {
                    format!("\n- **[{title}]({href})**\n")
                } else {
                    format!("\n- **[{title}]({href})** — {body}\n")
                }
            }

            Self::Tab => {
                let title = attr(attrs, "title").unwrap_or_default();
                format!("\n#### {}\n\n{}\n", title, inner.trim())
            }

            Self::Accordion => {
                let title = attr(attrs, "title").unwrap_or_default();
                format!(
                    "<details><summary>{}</summary>\n\n{}\n\n</details>",
                    title,
                    inner.trim()
                )
            }

            // Thin wrappers: strip the tags, retain the inner text.
            Self::Tooltip | Self::Frame | Self::Icon | Self::ParamField | Self::ResponseField => {
                inner.to_string()
            }
        }
    }

    /// Tolerant paired-form regex: attribute order varies freely.
    fn paired_re(self) -> Regex {
        Regex::new(&format!(r"(?s)<{0}\b([^>]*?)>(.*?)</{0}\s*>", self.tag())).expect("valid regex")
    }

    /// Tolerant self-closing form.
    fn self_closing_re(self) -> Regex {
        Regex::new(&format!(r"<{}\b([^>]*?)/>", self.tag())).expect("valid regex")
    }
}

/// Apply the dispatcher over all components until nothing changes.
///
/// Each round lowers the outermost occurrence of every component; nested
/// children surface for the next round. Bounded to keep malformed input
/// from looping.
fn lower_all(body: &str) -> String {
    let mut state = LowerState::default();
    let mut current = body.to_string();

    for _ in 0..8 {
        let mut next = current.clone();
        for component in COMPONENTS {
            next = component
                .paired_re()
                .replace_all(&next, |caps: &regex::Captures| {
                    component.lower(&caps[1], &caps[2], &mut state)
                })
                .to_string();
            next = component
                .self_closing_re()
                .replace_all(&next, |caps: &regex::Captures| {
                    component.lower(&caps[1], "", &mut state)
                })
                .to_string();
        }
        if next == current {
            break;
        }
        current = next;
    }

    collapse_blank_lines(&current)
}

/// Extract one attribute value, accepting single or double quotes and any
/// position in the attribute string.
fn attr(attrs: &str, name: &str) -> Option<String> {
    static CACHE: LazyLock<std::sync::Mutex<HashMap<String, Regex>>> =
        LazyLock::new(|| std::sync::Mutex::new(HashMap::new()));

    let mut cache = CACHE.lock().expect("attr regex cache");
    let re = cache
        .entry(name.to_string())
        .or_insert_with(|| {
            Regex::new(&format!(r#"\b{name}\s*=\s*(?:"([^"]*)"|'([^']*)')"#)).expect("valid regex")
        })
        .clone();
    drop(cache);

    re.captures(attrs)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

/// Render inner content as a labeled blockquote, quoting every line.
fn blockquote(label: &str, inner: &str) -> String {
    let mut out = format!("\n> {label} ");
    for (i, line) in inner.trim().lines().enumerate() {
        if i == 0 {
            out.push_str(line.trim());
        } else {
            out.push_str("\n> ");
            out.push_str(line.trim());
        }
    }
    out.push('\n');
    out
}

/// Flatten inner content to a single line for bullet bodies.
fn inline(inner: &str) -> String {
    inner.split_whitespace().collect::<Vec<_>>().join(" ")
}

static MULTI_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_blank_lines(text: &str) -> String {
    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
