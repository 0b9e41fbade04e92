//! Inline markup → HTML.
//!
//! Rewrites run in a fixed order, each a single non-overlapping pass over
//! the whole text:
//!
//! | Order | Source | Output |
//! |---|---|---|
//! | 1 | `###### h` … `# h` (line start) | `<h6>h</h6>` … `<h1>h</h1>` |
//! | 2 | `**x**` | `<b>x</b>` |
//! | 3 | `*x*` | `<i>x</i>` |
//! | 4 | `__x__` | `<u>x</u>` |
//! | 5 | `---` (line of 3+ dashes) | `<hr>` |
//! | 6 | `[label](target)` | link, or captioned image |

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::trace;

use crate::classify::ResourceClassifier;

struct Rules {
    headings: Vec<(Regex, String)>,
    bold: Regex,
    italic: Regex,
    underline: Regex,
    rule: Regex,
    link: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        let re = |src: &str| Regex::new(src).expect("markup regex");
        Rules {
            headings: (1..=6)
                .rev()
                .map(|n| {
                    (
                        re(&format!(r"(?m)^#{{{n}}}[ \t]+(.*?)[ \t]*(?:\n|$)")),
                        format!("<h{n}>${{1}}</h{n}>"),
                    )
                })
                .collect(),
            bold: re(r"\*\*(.*?)\*\*"),
            italic: re(r"\*(.*?)\*"),
            underline: re(r"__(.+?)__"),
            rule: re(r"(?m)^-{3,}[ \t]*(?:\n|$)"),
            link: re(r"\[(.*?)\](?:\((.*?)\))?"),
        }
    })
}

/// Apply the inline markup rewrites to a body.
pub fn transform(body: &str, classifier: &dyn ResourceClassifier) -> String {
    let r = rules();
    let mut text = body.to_owned();
    for (re, rep) in &r.headings {
        text = re.replace_all(&text, rep.as_str()).into_owned();
    }
    text = r.bold.replace_all(&text, "<b>${1}</b>").into_owned();
    text = r.italic.replace_all(&text, "<i>${1}</i>").into_owned();
    text = r.underline.replace_all(&text, "<u>${1}</u>").into_owned();
    text = r.rule.replace_all(&text, "<hr>").into_owned();
    r.link
        .replace_all(&text, |caps: &Captures<'_>| {
            let label = caps.get(1).map_or("", |m| m.as_str());
            let target = caps.get(2).map_or("", |m| m.as_str());
            render_link(label, target, classifier)
        })
        .into_owned()
}

fn render_link(label: &str, target: &str, classifier: &dyn ResourceClassifier) -> String {
    if !target.is_empty() && classifier.is_image(target) {
        trace!(target, "link resolved as image");
        return format!(
            "<figure><img src='{}' alt='{}'/><figcaption>{label}</figcaption></figure>",
            escape_attr(target),
            escape_attr(label)
        );
    }
    let text = if label.is_empty() { target } else { label };
    format!("<a href='{}'>{text}</a>", escape_attr(target))
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#x27;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

// ── Paragraphs ────────────────────────────────────────────────────────────────

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn paragraph_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("paragraph regex"))
}

/// Wrap blank-line separated paragraphs in `<p>` and turn remaining single
/// newlines into `<br>`.
pub fn linebreaks(text: &str) -> String {
    let text = normalize_newlines(text);
    paragraph_split_re()
        .split(&text)
        .map(|p| format!("<p>{}</p>", p.replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turn every newline into `<br>`.
pub fn linebreaksbr(text: &str) -> String {
    normalize_newlines(text).replace('\n', "<br>")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
