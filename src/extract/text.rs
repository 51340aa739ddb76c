//! Text-native formats: encoding fallback, Markdown, CSV, and best-effort
//! string recovery from legacy binary Office files.

/// Decode bytes as UTF-8, falling back to UTF-16 (when a BOM is present)
/// and then to Windows-1252.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    bytes.iter().map(|&b| windows_1252(b)).collect()
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| read([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// Map a Windows-1252 byte to its character. Bytes undefined in 1252 map
/// to the Latin-1 code point.
fn windows_1252(b: u8) -> char {
    const HIGH: [char; 32] = [
        '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8D}', 'Ž', '\u{8F}',
        '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9D}', 'ž', 'Ÿ',
    ];
    match b {
        0x80..=0x9F => HIGH[(b - 0x80) as usize],
        _ => b as char,
    }
}

/// Strip Markdown syntax, keeping the readable text and paragraph breaks.
pub fn strip_markdown(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut in_fence = false;

    for line in md.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if is_rule(trimmed) {
            out.push('\n');
            continue;
        }

        let mut body = trimmed;
        while let Some(rest) = body.strip_prefix('>') {
            body = rest.trim_start();
        }
        let hashes = body.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&hashes) && body[hashes..].starts_with(' ') {
            body = body[hashes..].trim();
        }
        body = strip_list_marker(body);

        out.push_str(&strip_inline(body));
        out.push('\n');
    }
    out
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-')
            || compact.chars().all(|c| c == '*')
            || compact.chars().all(|c| c == '_'))
}

fn strip_list_marker(line: &str) -> &str {
    for marker in ["- [ ] ", "- [x] ", "- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest;
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(r) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return r;
        }
    }
    line
}

/// Remove inline markup: images and links keep their text, code spans keep
/// their content, emphasis markers are dropped.
fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '!' if chars.get(i + 1) == Some(&'[') => {
                i += 1;
            }
            '[' => {
                if let Some((text, next)) = link_parts(&chars, i) {
                    out.push_str(&strip_inline(&text));
                    i = next;
                    continue;
                }
                out.push(c);
                i += 1;
            }
            '`' => {
                i += 1;
            }
            '*' => {
                i += 1;
            }
            '_' => {
                let prev_word = i > 0 && chars[i - 1].is_alphanumeric();
                let next_word = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
                if prev_word && next_word {
                    out.push(c);
                }
                i += 1;
            }
            '~' if chars.get(i + 1) == Some(&'~') => {
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Parse `[text](target)` starting at `open`; returns the text and the index
/// after the closing parenthesis.
fn link_parts(chars: &[char], open: usize) -> Option<(String, usize)> {
    let close = (open + 1..chars.len()).find(|&j| chars[j] == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let end = (close + 2..chars.len()).find(|&j| chars[j] == ')')?;
    Some((chars[open + 1..close].iter().collect(), end + 1))
}

/// Render CSV as one line per row with cells joined by ` | `.
///
/// Handles quoted fields with embedded delimiters, doubled quotes and line
/// breaks. The delimiter is `,` unless the header line has more `;` or tabs.
pub fn csv_to_text(text: &str) -> String {
    let delimiter = sniff_delimiter(text.lines().next().unwrap_or(""));
    let mut lines = Vec::new();
    for row in parse_csv(text, delimiter) {
        let cells: Vec<&str> = row.iter().map(|c| c.trim()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}

fn sniff_delimiter(header: &str) -> char {
    let count = |d: char| header.chars().filter(|&c| c == d).count();
    let (commas, semis, tabs) = (count(','), count(';'), count('\t'));
    if tabs > commas && tabs >= semis {
        '\t'
    } else if semis > commas {
        ';'
    } else {
        ','
    }
}

fn parse_csv(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Minimum run length for recovered strings.
const MIN_RUN: usize = 4;

/// Recover readable text from a legacy binary (OLE) Word or Excel file by
/// collecting printable UTF-16LE runs and single-byte runs, keeping
/// whichever encoding yields more text.
pub fn recover_strings(bytes: &[u8]) -> String {
    let wide = utf16_runs(bytes);
    let narrow = ascii_runs(bytes);
    let len = |runs: &[String]| runs.iter().map(|r| r.chars().count()).sum::<usize>();
    let runs = if len(&wide) >= len(&narrow) { wide } else { narrow };
    runs.join("\n")
}

fn is_printable(c: char) -> bool {
    !c.is_control() || c == '\t'
}

fn utf16_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for pair in bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        match char::from_u32(unit as u32) {
            Some(c) if is_printable(c) && !(0xD800..=0xDFFF).contains(&unit) && unit != 0xFFFF => {
                current.push(c)
            }
            Some('\r') | Some('\n') if !current.is_empty() => current.push('\n'),
            _ => flush_run(&mut runs, &mut current),
        }
    }
    flush_run(&mut runs, &mut current);
    runs
}

fn ascii_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        match b {
            0x20..=0x7E | b'\t' => current.push(b as char),
            b'\r' | b'\n' if !current.is_empty() => current.push('\n'),
            _ => flush_run(&mut runs, &mut current),
        }
    }
    flush_run(&mut runs, &mut current);
    runs
}

fn flush_run(runs: &mut Vec<String>, current: &mut String) {
    let run = std::mem::take(current);
    let trimmed = run.trim();
    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if trimmed.chars().count() >= MIN_RUN && letters * 2 >= trimmed.chars().count() {
        runs.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_with_bom() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFhello"), "hello");
    }

    #[test]
    fn test_decode_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for u in "héllo".encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        assert_eq!(decode_text(&bytes), "héllo");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        assert_eq!(decode_text(b"caf\xE9 \x93quoted\x94 \x80"), "café “quoted” €");
    }

    #[test]
    fn test_strip_markdown() {
        let md = "# Title\n\nSome **bold** and _em_ text with `code` and a [link](http://x.y).\n\n\
                  - item one\n1. first\n> quoted\n\n```rust\nlet snake_case = 1;\n```\n---\n![logo](a.png)";
        let text = strip_markdown(md);
        assert!(text.starts_with("Title\n\nSome bold and em text with code and a link.\n"));
        assert!(text.contains("\nitem one\nfirst\nquoted\n"));
        assert!(text.contains("let snake_case = 1;"));
        assert!(text.contains("logo"));
        assert!(!text.contains("```"));
        assert!(!text.contains("http://"));
    }

    #[test]
    fn test_csv_quoted_fields() {
        let csv = "name,note\r\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x\n\n";
        assert_eq!(
            csv_to_text(csv),
            "name | note\nSmith, J | said \"hi\"\nmulti\nline | x"
        );
    }

    #[test]
    fn test_csv_semicolon_delimiter() {
        assert_eq!(csv_to_text("a;b;c\n1;2;3"), "a | b | c\n1 | 2 | 3");
    }

    #[test]
    fn test_recover_utf16_strings() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0, 0, 1, 2];
        for u in "Quarterly report draft".encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0, 0xFF, 0x01]);
        assert!(recover_strings(&bytes).contains("Quarterly report draft"));
    }

    #[test]
    fn test_recover_ascii_strings() {
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(b"Budget summary for 2024");
        bytes.extend_from_slice(&[0, 1, 2, 3]);
        bytes.extend_from_slice(b"xz");
        assert_eq!(recover_strings(&bytes), "Budget summary for 2024");
    }
}
