// src/formatting.rs

//! Pure helpers that shape a batch of lines into message bodies and files.

/// Returns the first `n` lines, or all of them when `n` is zero or covers the input.
pub fn head_lines(lines: &[String], n: usize) -> &[String] {
    if n == 0 || n >= lines.len() {
        return lines;
    }
    &lines[..n]
}

/// Returns the last `n` lines, or all of them when `n` is zero or covers the input.
pub fn tail_lines(lines: &[String], n: usize) -> &[String] {
    if n == 0 || n >= lines.len() {
        return lines;
    }
    &lines[lines.len() - n..]
}

pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

pub fn wrap_code_block(text: &str) -> String {
    format!("```\n{}\n```", text)
}

/// Packs `line + "\n"` greedily into parts of at most `max_bytes`.
///
/// A single line larger than the budget becomes its own oversized part.
/// A budget of zero yields a single part holding everything.
pub fn build_attachment_parts(lines: &[String], max_bytes: usize) -> Vec<Vec<u8>> {
    if max_bytes == 0 {
        let mut all = join_lines(lines).into_bytes();
        all.push(b'\n');
        return vec![all];
    }

    let mut parts = Vec::new();
    let mut buf: Vec<u8> = Vec::new();
    for line in lines {
        let len = line.len() + 1;
        if !buf.is_empty() && buf.len() + len > max_bytes {
            parts.push(std::mem::take(&mut buf));
        }
        if len > max_bytes && buf.is_empty() {
            let mut oversized = Vec::with_capacity(len);
            oversized.extend_from_slice(line.as_bytes());
            oversized.push(b'\n');
            parts.push(oversized);
            continue;
        }
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    if !buf.is_empty() {
        parts.push(buf);
    }
    parts
}

pub const DEFAULT_SUMMARY_TOP: usize = 30;

/// A short digest: the line count followed by the first `top` lines.
/// A `top` of zero falls back to [`DEFAULT_SUMMARY_TOP`].
pub fn summary(lines: &[String], top: usize) -> String {
    if lines.is_empty() {
        return "No output captured.".to_string();
    }
    let top = if top == 0 { DEFAULT_SUMMARY_TOP } else { top };
    let shown = head_lines(lines, top);
    format!(
        "Lines: {}\n\nTop {}:\n{}",
        lines.len(),
        shown.len(),
        join_lines(shown)
    )
}

const MARKDOWN_V2_RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes every character reserved by the Telegram MarkdownV2 parse mode.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Splits `text` into pieces of at most `max` characters, never inside a code point.
pub fn chunk_by_chars(text: &str, max: usize) -> Vec<String> {
    if max == 0 || text.chars().count() <= max {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        if count == max {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Packs `\n`-separated lines into pieces of at most `max` characters.
///
/// Lines longer than `max` are cut with [`chunk_by_chars`].
fn pack_lines(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    let mut started = false;
    for line in text.split('\n') {
        let len = line.chars().count();
        if len > max {
            if started {
                chunks.push(std::mem::take(&mut current));
                count = 0;
                started = false;
            }
            chunks.extend(chunk_by_chars(line, max));
            continue;
        }
        if started && count + 1 + len > max {
            chunks.push(std::mem::take(&mut current));
            count = 0;
            started = false;
        }
        if started {
            current.push('\n');
            count += 1;
        }
        current.push_str(line);
        count += len;
        started = true;
    }
    if started {
        chunks.push(current);
    }
    chunks
}

/// Splits a message into pieces of at most `max` characters on line boundaries.
///
/// A message shaped like `header + "```\n" + body + "\n```"` keeps that shape
/// in every piece: the header is repeated and each piece of the body gets its
/// own code fence. Other text is packed line by line.
pub fn chunk_message(text: &str, max: usize) -> Vec<String> {
    if max == 0 || text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let fence_start = if text.starts_with("```\n") {
        Some(0)
    } else {
        text.find("\n```\n").map(|i| i + 1)
    };
    let fenced = fence_start.and_then(|start| {
        let body_start = start + 4;
        let body_end = text.len().checked_sub(4)?;
        (text.ends_with("\n```") && body_start <= body_end)
            .then(|| (&text[..start], &text[body_start..body_end]))
    });

    if let Some((header, body)) = fenced {
        let overhead = header.chars().count() + 8;
        if overhead < max {
            return pack_lines(body, max - overhead)
                .into_iter()
                .map(|piece| format!("{}{}", header, wrap_code_block(&piece)))
                .collect();
        }
    }
    pack_lines(text, max)
}
