//! HTML markup lexer using logos
//!
//! The lexer only splits markup into coarse tokens. Tag names and attributes
//! are pulled out of the token slice by [`parse_tag`], and raw-text element
//! bodies (`<script>`, `<style>` ...) are skipped by the tree builder with
//! [`logos::Lexer::bump`].

use logos::{Lexer, Logos};

/// Markup tokens
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
pub enum Token {
    /// `<!-- ... -->`, consumed up to the closing marker or end of input
    #[token("<!--", skip_comment)]
    Comment,

    /// `<!DOCTYPE ...>` and friends
    #[regex(r"<![A-Za-z][^>]*>")]
    Declaration,

    /// `<? ... >`
    #[regex(r"<\?[^>]*>")]
    ProcessingInstruction,

    #[regex(r"</[A-Za-z][^>]*>")]
    EndTag,

    #[regex(r#"<[A-Za-z]([^>"']|"[^"]*"|'[^']*')*>"#)]
    StartTag,

    #[regex(r"[^<]+")]
    Text,

    /// A `<` that does not open any markup
    #[token("<")]
    Lt,
}

fn skip_comment(lex: &mut Lexer<'_, Token>) {
    let rest = lex.remainder();

    // `<!-->` and `<!--->` are complete (empty) comments
    let end = if rest.starts_with('>') {
        1
    } else if rest.starts_with("->") {
        2
    } else {
        rest.find("-->").map(|i| i + 3).unwrap_or(rest.len())
    };
    lex.bump(end);
}

/// A parsed start or end tag
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Lowercased tag name
    pub name: String,
    /// Attributes in source order; names lowercased, values still encoded
    pub attributes: Vec<(String, String)>,
    /// Tag ended with `/>`
    pub self_closing: bool,
}

/// Extract name and attributes from a `StartTag` or `EndTag` slice
pub fn parse_tag(slice: &str) -> Tag {
    let inner = slice
        .trim_start_matches('<')
        .trim_start_matches('/')
        .strip_suffix('>')
        .unwrap_or(slice);

    let name_end = inner
        .find(|c: char| c.is_ascii_whitespace() || c == '/')
        .unwrap_or(inner.len());
    let name = inner[..name_end].to_ascii_lowercase();
    let self_closing = inner.ends_with('/');

    let mut attributes: Vec<(String, String)> = Vec::new();
    let mut rest = &inner[name_end..];

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let key_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        // A lone `=` still has to make progress
        let key_end = key_end.max(rest.chars().next().map(char::len_utf8).unwrap_or(1));
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start_matches(|c: char| c.is_ascii_whitespace());

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start_matches(|c: char| c.is_ascii_whitespace());
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(quote).unwrap_or(body.len());
                    value = body[..close].to_string();
                    rest = body.get(close + 1..).unwrap_or("");
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    value = after_eq[..end].to_string();
                    rest = &after_eq[end..];
                }
            }
        }

        // First occurrence wins, as in browsers
        if !attributes.iter().any(|(k, _)| *k == key) {
            attributes.push((key, value));
        }
    }

    Tag {
        name,
        attributes,
        self_closing,
    }
}

/// Tokenize markup, keeping the source slice of every token
pub fn tokenize(input: &str) -> Vec<(Token, &str)> {
    let mut lex = Token::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lex.next() {
        // Unmatched input is treated as text
        tokens.push((result.unwrap_or(Token::Text), lex.slice()));
    }
    tokens
}
