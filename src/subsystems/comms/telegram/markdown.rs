//! Model answers arrive as Markdown; Telegram's HTML mode understands only a
//! handful of tags. This converts the common subset (headings, bullets,
//! bold, italic, inline code, fenced blocks) and escapes everything else.
//!
//! Every call returns balanced markup, so each chunk of a long answer can be
//! converted on its own. Unpaired markers stay as literal text.

use std::sync::LazyLock;

use regex::Regex;

use super::texts::escape_html;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").expect("heading regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+").expect("bullet regex"));
static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]+`").expect("code span regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*|__([^_\n]+?)__").expect("bold regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w*])\*([^*\s][^*\n]*?)\*").expect("italic regex"));

pub fn markdown_to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut in_fence = false;

    for (i, line) in text.split('\n').enumerate() {
        if line.trim_start().starts_with("```") {
            if !in_fence && i > 0 && !out.is_empty() {
                out.push('\n');
            }
            out.push_str(if in_fence { "</pre>" } else { "<pre>" });
            in_fence = !in_fence;
            continue;
        }
        if i > 0 && !out.is_empty() && !out.ends_with("<pre>") {
            out.push('\n');
        }
        let line = escape_html(line);
        if in_fence {
            out.push_str(&line);
            continue;
        }
        if let Some(c) = HEADING.captures(&line) {
            out.push_str("<b>");
            out.push_str(&c[1].replace("**", "").replace("__", ""));
            out.push_str("</b>");
            continue;
        }
        let line = BULLET.replace(&line, "${1}• ");
        push_inline(&mut out, &line);
    }
    if in_fence {
        out.push_str("</pre>");
    }
    out
}

/// Code spans verbatim, emphasis everywhere else.
fn push_inline(out: &mut String, line: &str) {
    let mut last = 0;
    for m in CODE_SPAN.find_iter(line) {
        out.push_str(&emphasis(&line[last..m.start()]));
        out.push_str("<code>");
        out.push_str(&line[m.start() + 1..m.end() - 1]);
        out.push_str("</code>");
        last = m.end();
    }
    out.push_str(&emphasis(&line[last..]));
}

fn emphasis(text: &str) -> String {
    let bold = BOLD.replace_all(text, |c: &regex::Captures<'_>| {
        let inner = c.get(1).or_else(|| c.get(2)).map_or("", |m| m.as_str());
        format!("<b>{inner}</b>")
    });
    ITALIC.replace_all(&bold, "${1}<i>${2}</i>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_common_markup() {
        let md = "## Вводный инструктаж\n\n**Кто проводит:** специалист по ОТ.\n- не позднее *первого* дня\n* запись в `журнал`";
        assert_eq!(
            markdown_to_html(md),
            "<b>Вводный инструктаж</b>\n\n<b>Кто проводит:</b> специалист по ОТ.\n• не позднее <i>первого</i> дня\n• запись в <code>журнал</code>"
        );
    }

    #[test]
    fn escapes_model_html() {
        assert_eq!(markdown_to_html("<script> & **a<b**"), "&lt;script&gt; &amp; <b>a&lt;b</b>");
    }

    #[test]
    fn code_is_left_alone() {
        assert_eq!(markdown_to_html("`**x**` и __y__"), "<code>**x**</code> и <b>y</b>");
        assert_eq!(markdown_to_html("```\n**a**\n```\nдалее"), "<pre>**a**</pre>\nдалее");
    }

    #[test]
    fn unbalanced_markers_stay_literal() {
        assert_eq!(markdown_to_html("ст. 212 **ТК"), "ст. 212 **ТК");
        assert_eq!(markdown_to_html("2*3 = 6"), "2*3 = 6");
        // A chunk cut inside a fenced block is closed.
        assert_eq!(markdown_to_html("```\nline"), "<pre>line</pre>");
    }
}
