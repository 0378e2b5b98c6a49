//! 标记扫描：在文本中查找 `${...}` / `#{...}` 一类的定界标记并逐个回调。
//!
//! 反斜杠可以转义开标记与闭标记（`\${` 原样输出 `${`）；
//! 没有闭标记的开标记不报错，剩余文本原样保留。

/// 扫描 `text` 中 `open`...`close` 定界的标记，标记内容交给 `handler`，
/// 返回替换后的文本。`open`/`close` 须为 ASCII 标记。
pub(crate) fn parse_tokens<E>(
    text: &str,
    open: &str,
    close: &str,
    handler: &mut dyn FnMut(&str) -> Result<String, E>,
) -> Result<String, E> {
    let Some(mut start) = text.find(open) else {
        return Ok(text.to_string());
    };
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut offset = 0usize;
    loop {
        if start > 0 && bytes[start - 1] == b'\\' {
            // 开标记被转义：去掉反斜杠，标记原样输出
            out.push_str(&text[offset..start - 1]);
            out.push_str(open);
            offset = start + open.len();
        } else {
            out.push_str(&text[offset..start]);
            offset = start + open.len();
            let mut expr = String::new();
            let mut end = text[offset..].find(close).map(|p| p + offset);
            while let Some(e) = end {
                if e <= offset || bytes[e - 1] != b'\\' {
                    expr.push_str(&text[offset..e]);
                    break;
                }
                // 闭标记被转义：去掉反斜杠，继续找真正的闭标记
                expr.push_str(&text[offset..e - 1]);
                expr.push_str(close);
                offset = e + close.len();
                end = text[offset..].find(close).map(|p| p + offset);
            }
            match end {
                None => {
                    // 没有闭标记：剩余文本原样保留
                    out.push_str(&text[start..]);
                    offset = text.len();
                }
                Some(e) => {
                    out.push_str(&handler(&expr)?);
                    offset = e + close.len();
                }
            }
        }
        match text[offset..].find(open).map(|p| p + offset) {
            Some(s) => start = s,
            None => break,
        }
    }
    out.push_str(&text[offset..]);
    Ok(out)
}

/// 文本中是否含有未转义的 `open`...`close` 标记。
pub(crate) fn contains_token(text: &str, open: &str, close: &str) -> bool {
    let mut found = false;
    let _ = parse_tokens::<()>(text, open, close, &mut |_| {
        found = true;
        Ok(String::new())
    });
    found
}

#[cfg(test)]
mod tests {
    use super::{contains_token, parse_tokens};
    use pretty_assertions::assert_eq;

    fn upper(text: &str) -> String {
        parse_tokens::<()>(text, "${", "}", &mut |expr| Ok(expr.to_uppercase()))
            .unwrap_or_default()
    }

    #[test]
    fn replaces_tokens_in_order() {
        assert_eq!(upper("a ${x} b ${y} c"), "a X b Y c");
    }

    #[test]
    fn escaped_open_token_stays_literal() {
        assert_eq!(upper(r"a \${x} b"), "a ${x} b");
    }

    #[test]
    fn escaped_close_token_belongs_to_expr() {
        let out = parse_tokens::<()>(r"${a\}b}", "${", "}", &mut |expr| Ok(expr.to_string()));
        assert_eq!(out.unwrap(), "a}b");
    }

    #[test]
    fn unclosed_token_passes_through() {
        assert_eq!(upper("a ${x b"), "a ${x b");
    }

    #[test]
    fn detects_unescaped_tokens_only() {
        assert!(contains_token("a ${x} b", "${", "}"));
        assert!(!contains_token(r"a \${x} b", "${", "}"));
        assert!(!contains_token("a #{x} b", "${", "}"));
        assert!(!contains_token("a ${x b", "${", "}"));
    }
}
