//! Whitespace and escaping helpers shared by the scripting bridge and the
//! serializer.

/// Expand tabs to the next multiple of `tab_width` columns.
pub fn untabify(line: &str, tab_width: usize) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let width = tab_width.max(1);
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = width - column % width;
            out.extend(std::iter::repeat_n(' ', pad));
            column += pad;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    out
}

/// Re-indent a block of text.
///
/// Blank lines at either end are dropped, tabs are expanded, the indentation
/// common to all non-blank lines is removed and `indent` is put in its place.
/// Trailing whitespace is kept, since it may sit inside a string literal.
/// Every emitted line ends with `\n`; blank lines do not get `indent`.
pub fn reindent(indent: &str, text: &str, tab_width: usize) -> String {
    let lines: Vec<String> = text.lines().map(|line| untabify(line, tab_width)).collect();
    let Some(first) = lines.iter().position(|l| !is_blank(l)) else {
        return String::new();
    };
    let last = lines.iter().rposition(|l| !is_blank(l)).unwrap_or(first);
    let body = &lines[first..=last];

    let cut = body
        .iter()
        .filter(|l| !is_blank(l))
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut out = String::new();
    for line in body {
        if !is_blank(line) {
            out.push_str(indent);
        }
        out.extend(line.chars().skip(cut));
        out.push('\n');
    }
    out
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Escape `&`, `<` and `>` for text content.
pub fn escape_text(s: &str) -> String {
    escape(s, false)
}

/// Escape text for a double-quoted attribute value.
pub fn escape_attribute(s: &str) -> String {
    escape(s, true)
}

fn escape(s: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untabify_aligns_to_tab_stops() {
        assert_eq!(untabify("\tx", 4), "    x");
        assert_eq!(untabify("ab\tx", 4), "ab  x");
        assert_eq!(untabify("abcd\tx", 4), "abcd    x");
    }

    #[test]
    fn reindent_strips_common_indent_and_blank_edges() {
        let code = "\n\n    if x:\n        y()\n\n    z()\n   \n";
        assert_eq!(reindent("", code, 4), "if x:\n    y()\n\nz()\n");
        assert_eq!(reindent("  ", "a\n b", 4), "  a\n   b\n");
    }

    #[test]
    fn reindent_expands_tabs_before_measuring() {
        assert_eq!(reindent("", "\tx = 1\n    y = 2", 4), "x = 1\ny = 2\n");
    }

    #[test]
    fn reindent_keeps_trailing_whitespace() {
        let code = "\n  let s = `a  \n  b `;\n\n";
        assert_eq!(reindent("", code, 4), "let s = `a  \nb `;\n");
        assert_eq!(reindent("> ", "  x\n     \n  y", 4), "> x\n   \n> y\n");
    }

    #[test]
    fn reindent_of_blank_text_is_empty() {
        assert_eq!(reindent("  ", " \n\t\n", 4), "");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a < b && c > \"d\""), "a &lt; b &amp;&amp; c &gt; \"d\"");
        assert_eq!(escape_attribute("say \"hi\" & <go>"), "say &quot;hi&quot; &amp; &lt;go&gt;");
    }
}
