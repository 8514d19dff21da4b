//! Jiraのwikiマークアップをプレーンテキストに変換する
//!
//! 変換は行単位で行い、各行の規則は変化がなくなるまで繰り返し適用する。
//! `{code}` / `{noformat}` の中身は4スペースでインデントしてそのまま残し、
//! 4スペースで始まる行は再変換しない。このため `normalize` は冪等になる。
//!
//! v3 APIが返すADF（Atlassian Document Format）は先に `flatten_adf` で
//! wikiマークアップへ変換し、同じ正規化を通す。

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const PREFORMATTED_INDENT: &str = "    ";
const MAX_PASSES: usize = 16;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{(code|noformat)(?::[^}]*)?\}").expect("valid regex"));

/// 1行に適用する規則（順序に意味がある）
static LINE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // 水平線
        (r"^-{4,}$", ""),
        // 見出し・引用
        (r"^[hH][1-6]\.\s*", ""),
        (r"^bq\.\s*", ""),
        // リスト（ネストも含めて `- ` に揃える）
        (r"^(?:[*#]+|-)\s+", "- "),
        // 既知のマクロ
        (
            r"\{(?:color|panel|quote|anchor|section|column|code|noformat)(?::[^}]*)?\}",
            "",
        ),
        // 等幅
        (r"\{\{(.+?)\}\}", "${1}"),
        // 画像
        (
            r"(?i)!([^!\s|]+\.(?:png|jpe?g|gif|svg|bmp|webp))(?:\|[^!]*)?!",
            "(image: ${1})",
        ),
        // メンション・リンク・添付
        (r"\[~([^\]|]+)\]", "@${1}"),
        (r"\[([^\]|]+)\|([^\]|]+)\]", "${1} (${2})"),
        (r"\[((?:https?|ftp|file|mailto):[^\]\s]*)\]", "${1}"),
        (r"\[\^([^\]]+)\]", "${1}"),
        // 強調
        (r"(^|[^\w*])\*([^\s*](?:[^*]*[^\s*])?)\*($|[^\w*])", "${1}${2}${3}"),
        (r"(^|[^\w_])_([^\s_](?:[^_]*[^\s_])?)_($|[^\w_])", "${1}${2}${3}"),
        (r"(^|[^\w-])-([^\s-](?:[^-]*[^\s-])?)-($|[^\w-])", "${1}${2}${3}"),
        (r"(^|[^\w+])\+([^\s+](?:[^+]*[^\s+])?)\+($|[^\w+])", "${1}${2}${3}"),
        (r"\?\?([^?\s](?:[^?]*[^?\s])?)\?\?", "${1}"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

/// スマートクォートと、そのUTF-8文字化け
const QUOTE_REPLACEMENTS: &[(&str, &str)] = &[
    ("\u{e2}\u{20ac}\u{2122}", "'"),
    ("\u{e2}\u{20ac}\u{2dc}", "'"),
    ("\u{e2}\u{20ac}\u{153}", "\""),
    ("\u{e2}\u{20ac}\u{9d}", "\""),
    ("\u{e2}\u{20ac}", "\""),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201c}", "\""),
    ("\u{201d}", "\""),
    ("\u{a0}", " "),
];

/// Jiraマークアップをプレーンテキストに変換
pub fn normalize(markup: &str) -> String {
    let mut text = markup.replace("\r\n", "\n").replace('\r', "\n");
    for (from, to) in QUOTE_REPLACEMENTS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }

    let mut lines: Vec<String> = Vec::new();
    let mut open_fence: Option<&'static str> = None;

    for raw in text.split('\n') {
        if let Some(closing) = open_fence {
            match raw.find(closing) {
                Some(pos) => {
                    if !raw[..pos].trim().is_empty() {
                        push_code_line(&mut lines, &raw[..pos]);
                    }
                    open_fence = None;
                    let rest = &raw[pos + closing.len()..];
                    if !rest.trim().is_empty() {
                        lines.push(normalize_line(rest));
                    }
                }
                None => push_code_line(&mut lines, raw),
            }
            continue;
        }

        if raw.starts_with(PREFORMATTED_INDENT) && !raw.trim().is_empty() {
            lines.push(raw.trim_end().to_string());
            continue;
        }

        let trimmed = raw.trim();
        if let Some(caps) = CODE_FENCE.captures(trimmed) {
            let closing = if &caps[1] == "code" { "{code}" } else { "{noformat}" };
            let rest = &trimmed[caps[0].len()..];
            // 同じ行で閉じている場合はインラインとして扱う
            if !rest.contains(closing) {
                open_fence = Some(closing);
                if !rest.trim().is_empty() {
                    push_code_line(&mut lines, rest);
                }
                continue;
            }
        }

        lines.push(normalize_line(trimmed));
    }

    collapse_blank_lines(lines)
}

fn push_code_line(lines: &mut Vec<String>, content: &str) {
    let content = content.trim_end();
    if content.trim().is_empty() {
        lines.push(String::new());
    } else {
        lines.push(format!("{}{}", PREFORMATTED_INDENT, content));
    }
}

fn normalize_line(line: &str) -> String {
    let mut current = line.trim().to_string();
    for _ in 0..MAX_PASSES {
        let mut next = current.clone();
        for (pattern, replacement) in LINE_RULES.iter() {
            if pattern.is_match(&next) {
                next = pattern.replace_all(&next, *replacement).into_owned();
            }
        }
        let next = next.trim().to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn collapse_blank_lines(lines: Vec<String>) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && out.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        out.push(if blank { String::new() } else { line });
    }
    out.join("\n").trim_end().to_string()
}

/// ADFドキュメントをwikiマークアップに変換
pub fn flatten_adf(node: &Value) -> String {
    let mut out = String::new();
    write_block(node, 0, &mut out);
    out.trim_end().to_string()
}

fn children(node: &Value) -> &[Value] {
    node.get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn node_type(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or("")
}

fn attr<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    node.get("attrs").and_then(|a| a.get(name))
}

fn write_block(node: &Value, depth: usize, out: &mut String) {
    match node_type(node) {
        "doc" | "panel" | "expand" | "nestedExpand" | "layoutSection" | "layoutColumn" => {
            for child in children(node) {
                write_block(child, depth, out);
            }
        }
        "paragraph" => {
            out.push_str(&inline_text(children(node)));
            out.push_str("\n\n");
        }
        "heading" => {
            let level = attr(node, "level").and_then(Value::as_u64).unwrap_or(1).clamp(1, 6);
            out.push_str(&format!("h{}. {}\n\n", level, inline_text(children(node))));
        }
        "bulletList" | "orderedList" => {
            let marker = if node_type(node) == "bulletList" { "*" } else { "#" };
            for item in children(node) {
                write_list_item(item, marker, depth + 1, out);
            }
            if depth == 0 {
                out.push('\n');
            }
        }
        "codeBlock" => {
            out.push_str("{code}\n");
            out.push_str(&inline_text(children(node)));
            out.push_str("\n{code}\n\n");
        }
        "blockquote" => {
            let mut inner = String::new();
            for child in children(node) {
                write_block(child, depth, &mut inner);
            }
            for line in inner.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&format!("bq. {}\n", line));
            }
            out.push('\n');
        }
        "rule" => out.push_str("----\n\n"),
        "table" => {
            for row in children(node) {
                let cells: Vec<String> = children(row)
                    .iter()
                    .map(|cell| {
                        let mut inner = String::new();
                        for child in children(cell) {
                            write_block(child, depth, &mut inner);
                        }
                        inner.split_whitespace().collect::<Vec<_>>().join(" ")
                    })
                    .collect();
                out.push_str(&cells.join(" | "));
                out.push('\n');
            }
            out.push('\n');
        }
        "mediaSingle" | "mediaGroup" | "media" => {}
        _ => {
            if node.get("content").is_some() {
                for child in children(node) {
                    write_block(child, depth, out);
                }
            } else {
                let text = inline_text(std::slice::from_ref(node));
                if !text.is_empty() {
                    out.push_str(&text);
                    out.push_str("\n\n");
                }
            }
        }
    }
}

fn write_list_item(item: &Value, marker: &str, depth: usize, out: &mut String) {
    let prefix = marker.repeat(depth);
    let mut first = true;
    for child in children(item) {
        match node_type(child) {
            "bulletList" | "orderedList" => write_block(child, depth, out),
            _ => {
                let text = inline_text(children(child));
                if first {
                    out.push_str(&format!("{} {}\n", prefix, text));
                    first = false;
                } else if !text.is_empty() {
                    out.push_str(&text);
                    out.push('\n');
                }
            }
        }
    }
}

fn inline_text(nodes: &[Value]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node_type(node) {
            "text" => {
                let text = node.get("text").and_then(Value::as_str).unwrap_or("");
                out.push_str(&apply_marks(text, node.get("marks")));
            }
            "hardBreak" => out.push('\n'),
            "mention" => {
                let name = attr(node, "text")
                    .and_then(Value::as_str)
                    .or_else(|| attr(node, "id").and_then(Value::as_str))
                    .unwrap_or("unknown");
                out.push_str(&format!("[~{}]", name.trim_start_matches('@')));
            }
            "emoji" => {
                let text = attr(node, "text")
                    .or_else(|| attr(node, "shortName"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                out.push_str(text);
            }
            "inlineCard" | "blockCard" => {
                if let Some(url) = attr(node, "url").and_then(Value::as_str) {
                    out.push_str(&format!("[{}]", url));
                }
            }
            "date" => {
                if let Some(ts) = attr(node, "timestamp").and_then(Value::as_str) {
                    out.push_str(ts);
                }
            }
            "status" => {
                if let Some(text) = attr(node, "text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            _ => out.push_str(&inline_text(children(node))),
        }
    }
    out
}

fn apply_marks(text: &str, marks: Option<&Value>) -> String {
    let Some(marks) = marks.and_then(Value::as_array) else {
        return text.to_string();
    };
    if text.trim().is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for mark in marks {
        result = match node_type(mark) {
            "strong" => format!("*{}*", result),
            "em" => format!("_{}_", result),
            "strike" => format!("-{}-", result),
            "underline" => format!("+{}+", result),
            "code" => format!("{{{{{}}}}}", result),
            "link" => match attr(mark, "href").and_then(Value::as_str) {
                Some(href) => format!("[{}|{}]", result, href),
                None => result,
            },
            _ => result,
        };
    }
    result
}
