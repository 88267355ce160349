//! HTML character references
//!
//! Decoding happens once, while markup is tokenized; escaping happens once,
//! while the cleaned tree is serialized.

/// Decode named and numeric character references.
///
/// Numeric references are accepted without a trailing semicolon, the way
/// browsers accept them, so `&#106avascript:` decodes to `javascript:`.
/// Unknown named references are left untouched.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];

        match decode_reference(candidate) {
            Some((decoded, consumed)) => {
                out.push(decoded);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode a single reference at the start of `s` (which begins with `&`).
/// Returns the decoded character and the number of bytes consumed.
fn decode_reference(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];

    if let Some(numeric) = body.strip_prefix('#') {
        let (digits, radix, prefix_len) = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16, 2),
            None => (numeric, 10, 1),
        };

        let len = digits
            .char_indices()
            .take_while(|(_, c)| c.is_digit(radix))
            .map(|(i, c)| i + c.len_utf8())
            .last()?;

        // Cap the digit run; anything longer is out of range anyway
        let value = u32::from_str_radix(&digits[..len.min(8)], radix).unwrap_or(0x110000);
        let decoded = match char::from_u32(value) {
            Some('\0') | None => '\u{FFFD}',
            Some(c) => c,
        };

        let mut consumed = 1 + prefix_len + len;
        if digits[len..].starts_with(';') {
            consumed += 1;
        }
        return Some((decoded, consumed));
    }

    let name_len = body
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphanumeric())
        .map(|(i, _)| i + 1)
        .last()?;
    if !body[name_len..].starts_with(';') {
        return None;
    }

    named_entity(&body[..name_len]).map(|c| (c, 1 + name_len + 1))
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" | "AMP" => '&',
        "lt" | "LT" => '<',
        "gt" | "GT" => '>',
        "quot" | "QUOT" => '"',
        "apos" => '\'',
        "nbsp" => '\u{A0}',
        "colon" => ':',
        "sol" => '/',
        "bsol" => '\\',
        "lpar" => '(',
        "rpar" => ')',
        "equals" => '=',
        "period" => '.',
        "comma" => ',',
        "semi" => ';',
        "excl" => '!',
        "quest" => '?',
        "num" => '#',
        "percnt" => '%',
        "Tab" => '\t',
        "NewLine" => '\n',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "deg" => '°',
        "plusmn" => '±',
        "times" => '×',
        "divide" => '÷',
        "euro" => '€',
        "pound" => '£',
        "yen" => '¥',
        "cent" => '¢',
        "sect" => '§',
        "para" => '¶',
        "iexcl" => '¡',
        "iquest" => '¿',
        _ => return None,
    };
    Some(c)
}

/// Escape text content for serialization
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value for serialization
pub fn escape_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
