//! Entity decoding and escaping
//!
//! Decoding covers numeric references and the named entities that show up in
//! real documents. Anything unrecognised is left exactly as written.

use std::borrow::Cow;

/// Named entities, sorted by name for binary search.
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("AElig", 'Æ'),
    ("Aacute", 'Á'),
    ("Agrave", 'À'),
    ("Auml", 'Ä'),
    ("Ccedil", 'Ç'),
    ("Eacute", 'É'),
    ("Egrave", 'È'),
    ("Ntilde", 'Ñ'),
    ("Oacute", 'Ó'),
    ("Ouml", 'Ö'),
    ("Uacute", 'Ú'),
    ("Uuml", 'Ü'),
    ("aacute", 'á'),
    ("acute", '´'),
    ("aelig", 'æ'),
    ("agrave", 'à'),
    ("alpha", 'α'),
    ("amp", '&'),
    ("apos", '\''),
    ("auml", 'ä'),
    ("beta", 'β'),
    ("brvbar", '¦'),
    ("bull", '•'),
    ("ccedil", 'ç'),
    ("cedil", '¸'),
    ("cent", '¢'),
    ("copy", '©'),
    ("curren", '¤'),
    ("dagger", '†'),
    ("darr", '↓'),
    ("deg", '°'),
    ("delta", 'δ'),
    ("divide", '÷'),
    ("eacute", 'é'),
    ("egrave", 'è'),
    ("emsp", '\u{2003}'),
    ("ensp", '\u{2002}'),
    ("euml", 'ë'),
    ("euro", '€'),
    ("frac12", '½'),
    ("frac14", '¼'),
    ("frac34", '¾'),
    ("gamma", 'γ'),
    ("ge", '≥'),
    ("gt", '>'),
    ("harr", '↔'),
    ("hellip", '…'),
    ("iacute", 'í'),
    ("iexcl", '¡'),
    ("infin", '∞'),
    ("iquest", '¿'),
    ("iuml", 'ï'),
    ("lambda", 'λ'),
    ("laquo", '«'),
    ("larr", '←'),
    ("ldquo", '“'),
    ("le", '≤'),
    ("lrm", '\u{200E}'),
    ("lsaquo", '‹'),
    ("lsquo", '‘'),
    ("lt", '<'),
    ("macr", '¯'),
    ("mdash", '—'),
    ("micro", 'µ'),
    ("middot", '·'),
    ("mu", 'μ'),
    ("nbsp", '\u{A0}'),
    ("ndash", '–'),
    ("ne", '≠'),
    ("not", '¬'),
    ("ntilde", 'ñ'),
    ("oacute", 'ó'),
    ("omega", 'ω'),
    ("ordf", 'ª'),
    ("ordm", 'º'),
    ("ouml", 'ö'),
    ("para", '¶'),
    ("pi", 'π'),
    ("plusmn", '±'),
    ("pound", '£'),
    ("quot", '"'),
    ("raquo", '»'),
    ("rarr", '→'),
    ("rdquo", '”'),
    ("reg", '®'),
    ("rlm", '\u{200F}'),
    ("rsaquo", '›'),
    ("rsquo", '’'),
    ("sbquo", '‚'),
    ("sect", '§'),
    ("shy", '\u{AD}'),
    ("sigma", 'σ'),
    ("sup1", '¹'),
    ("sup2", '²'),
    ("sup3", '³'),
    ("szlig", 'ß'),
    ("thinsp", '\u{2009}'),
    ("times", '×'),
    ("trade", '™'),
    ("uacute", 'ú'),
    ("uarr", '↑'),
    ("uml", '¨'),
    ("uuml", 'ü'),
    ("yen", '¥'),
    ("zwj", '\u{200D}'),
    ("zwnj", '\u{200C}'),
];

/// Longest named entity we bother scanning for.
const MAX_NAME_LEN: usize = 8;

const MAX_HEX_DIGITS: usize = 6;
const MAX_DEC_DIGITS: usize = 7;

fn lookup_named(name: &str) -> Option<char> {
    NAMED_ENTITIES
        .binary_search_by(|(n, _)| (*n).cmp(name))
        .ok()
        .map(|idx| NAMED_ENTITIES[idx].1)
}

/// Parse a reference starting right after `&`. Returns the decoded char and
/// the number of bytes consumed after the `&`.
fn decode_reference(rest: &str) -> Option<(char, usize)> {
    let bytes = rest.as_bytes();

    if bytes.first() == Some(&b'#') {
        let (is_hex, digits_start) = match bytes.get(1) {
            Some(b'x') | Some(b'X') => (true, 2),
            _ => (false, 1),
        };
        let max_digits = if is_hex { MAX_HEX_DIGITS } else { MAX_DEC_DIGITS };
        let digits_len = bytes[digits_start..]
            .iter()
            .take(max_digits + 1)
            .take_while(|b| {
                if is_hex {
                    b.is_ascii_hexdigit()
                } else {
                    b.is_ascii_digit()
                }
            })
            .count();
        if digits_len == 0 || digits_len > max_digits {
            return None;
        }
        let digits = &rest[digits_start..digits_start + digits_len];
        let value = u32::from_str_radix(digits, if is_hex { 16 } else { 10 }).ok()?;
        let decoded = match value {
            0 => '\u{FFFD}',
            v => char::from_u32(v).unwrap_or('\u{FFFD}'),
        };
        let mut consumed = digits_start + digits_len;
        if bytes.get(consumed) == Some(&b';') {
            consumed += 1;
        }
        return Some((decoded, consumed));
    }

    let name_len = bytes
        .iter()
        .take(MAX_NAME_LEN + 1)
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || name_len > MAX_NAME_LEN || bytes.get(name_len) != Some(&b';') {
        return None;
    }
    lookup_named(&rest[..name_len]).map(|c| (c, name_len + 1))
}

/// Decode character references in `input`.
///
/// Borrows when there is nothing to decode.
pub fn decode(input: &str) -> Cow<'_, str> {
    let Some(first) = memchr::memchr(b'&', input.as_bytes()) else {
        return Cow::Borrowed(input);
    };

    let mut out = String::with_capacity(input.len());
    out.push_str(&input[..first]);
    let mut pos = first;

    while pos < input.len() {
        let rest = &input[pos..];
        if !rest.starts_with('&') {
            let next = memchr::memchr(b'&', rest.as_bytes()).unwrap_or(rest.len());
            out.push_str(&rest[..next]);
            pos += next;
            continue;
        }
        match decode_reference(&rest[1..]) {
            Some((c, consumed)) => {
                out.push(c);
                pos += 1 + consumed;
            }
            None => {
                out.push('&');
                pos += 1;
            }
        }
    }

    Cow::Owned(out)
}

/// Escape text content for markup output.
pub fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape an attribute value for use inside double quotes.
pub fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Minimal attribute escaping for literal (undecoded) values: only the
/// delimiter is replaced.
pub fn escape_attribute_quotes(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '"' => output.push_str("&quot;"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_table_is_sorted() {
        assert!(NAMED_ENTITIES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_decode_named_and_numeric() {
        assert_eq!(decode("a &amp; b"), "a & b");
        assert_eq!(decode("&lt;p&gt;"), "<p>");
        assert_eq!(decode("&#960;&#x3C0;&#X3c0;"), "πππ");
        assert_eq!(decode("&copy; 2024"), "© 2024");
    }

    #[test]
    fn test_decode_leaves_unknown_literal() {
        assert_eq!(decode("&bogus; & &amp"), "&bogus; & &amp");
        assert_eq!(decode("&#;"), "&#;");
        assert_eq!(decode("AT&T"), "AT&T");
    }

    #[test]
    fn test_decode_borrows_without_ampersand() {
        assert!(matches!(decode("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_decode_invalid_code_point() {
        assert_eq!(decode("&#0;"), "\u{FFFD}");
        assert_eq!(decode("&#xD800;"), "\u{FFFD}");
    }

    #[test]
    fn test_escape_text() {
        let mut output = String::new();
        escape_text("Hello <world> & \"friends\"", &mut output);
        assert_eq!(output, "Hello &lt;world&gt; &amp; \"friends\"");
    }

    #[test]
    fn test_escape_attribute() {
        let mut output = String::new();
        escape_attribute("Hello <world> & \"friends\"", &mut output);
        assert_eq!(output, "Hello &lt;world&gt; &amp; &quot;friends&quot;");

        let mut literal = String::new();
        escape_attribute_quotes("a &amp; \"b\"", &mut literal);
        assert_eq!(literal, "a &amp; &quot;b&quot;");
    }
}
