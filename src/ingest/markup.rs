/// Minimal tag extraction for the flat XML documents the data portal returns.
///
/// The payloads are shallow and regular: a list of `<item>` blocks, each
/// holding scalar child elements. Nothing here validates documents or handles
/// namespaces; it finds elements by name and returns their text.

/// Inner content of every `<tag>...</tag>` element, in document order.
/// Self-closing `<tag/>` elements yield an empty block.
pub fn blocks<'a>(doc: &'a str, tag: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = doc;

    while let Some((inner, after)) = next_element(rest, tag) {
        out.push(inner);
        rest = after;
    }
    out
}

/// Text of the first `<tag>` child inside `block`, with CDATA unwrapped and
/// the five predefined entities decoded. `None` if the element is absent.
pub fn element_text(block: &str, tag: &str) -> Option<String> {
    next_element(block, tag).map(|(inner, _)| decode_text(inner))
}

/// Finds the next element named `tag`. Returns its inner content and the
/// remainder of the input after its closing tag.
fn next_element<'a>(input: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut search_from = 0;

    loop {
        let at = search_from + input[search_from..].find(&open)?;
        let after_name = at + open.len();
        let tail = &input[after_name..];

        // `<item` must not match `<items>`.
        match tail.chars().next() {
            Some('>') | Some('/') => {}
            Some(c) if c.is_whitespace() => {}
            _ => {
                search_from = after_name;
                continue;
            }
        }

        let gt = after_name + tag_end(tail)?;
        if input[after_name..gt].trim_end().ends_with('/') {
            return Some(("", &input[gt + 1..]));
        }

        let body_start = gt + 1;
        let body_len = input[body_start..].find(&close)?;
        let body_end = body_start + body_len;
        return Some((&input[body_start..body_end], &input[body_end + close.len()..]));
    }
}

/// Offset of the `>` closing a start tag, skipping quoted attribute values.
fn tag_end(tail: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tail.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn decode_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        return inner.trim().to_string();
    }
    trimmed
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
