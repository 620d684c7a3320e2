//! Token scanner for the view-function dialect.
//!
//! The compiler works on positions in the original text, so the scanner
//! produces a flat token list with byte spans instead of a tree. Template
//! literals are flattened too: a tagged template contributes open/close
//! markers, literal chunks, and interpolation delimiters, and the code
//! inside `${...}` is lexed as ordinary tokens. That is what lets binding
//! collection, dependency scanning, and site rewriting treat interpolated
//! expressions exactly like any other code.
//!
//! Comments are skipped entirely; string and template *text* is kept as
//! opaque tokens, so identifier-like text inside literals never matches a
//! binding name.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
    /// Opening backtick of a template literal.
    TemplateOpen,
    /// Literal text between interpolations.
    TemplateChunk,
    /// `${`
    InterpOpen,
    /// `}` closing an interpolation.
    InterpClose,
    /// Closing backtick.
    TemplateClose,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

/// Lexing failure: some delimited region never closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unterminated {what} at offset {offset}")]
pub struct LexError {
    pub what: &'static str,
    pub offset: usize,
}

enum Mode {
    /// Inside template literal text.
    Template { open: usize },
    /// Inside a `${...}` interpolation, tracking unbalanced `{`.
    Interp { open: usize, braces: usize },
}

/// Three- and two-byte operators, longest match first.
const PUNCT3: &[&str] = &[
    "===", "!==", "**=", "...", "<<=", ">>=", "&&=", "||=", "??=",
];
const PUNCT2: &[&str] = &[
    "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=",
    "%=", "**", "<<", ">>", "&=", "|=", "^=",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Scan `src` into a flat token list.
pub fn lex(src: &str) -> Result<Vec<Token>, LexError> {
    let bytes = src.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut modes: Vec<Mode> = Vec::new();
    let mut i = 0;

    while i < len {
        if let Some(Mode::Template { open }) = modes.last() {
            let open = *open;
            let chunk_start = i;
            let mut boundary = None;
            while i < len {
                match bytes[i] {
                    b'\\' => i = (i + 2).min(len),
                    b'`' => {
                        boundary = Some(TokenKind::TemplateClose);
                        break;
                    }
                    b'$' if bytes.get(i + 1) == Some(&b'{') => {
                        boundary = Some(TokenKind::InterpOpen);
                        break;
                    }
                    _ => i += 1,
                }
            }
            if i > chunk_start {
                tokens.push(Token {
                    kind: TokenKind::TemplateChunk,
                    start: chunk_start,
                    end: i,
                });
            }
            match boundary {
                Some(TokenKind::TemplateClose) => {
                    tokens.push(Token {
                        kind: TokenKind::TemplateClose,
                        start: i,
                        end: i + 1,
                    });
                    i += 1;
                    modes.pop();
                }
                Some(TokenKind::InterpOpen) => {
                    tokens.push(Token {
                        kind: TokenKind::InterpOpen,
                        start: i,
                        end: i + 2,
                    });
                    modes.push(Mode::Interp { open: i, braces: 0 });
                    i += 2;
                }
                _ => {
                    return Err(LexError {
                        what: "template literal",
                        offset: open,
                    })
                }
            }
            continue;
        }

        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let open = i;
                i += 2;
                loop {
                    if i + 1 >= len {
                        return Err(LexError {
                            what: "block comment",
                            offset: open,
                        });
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b'"' | b'\'' => {
                let quote = c;
                let start = i;
                i += 1;
                loop {
                    if i >= len {
                        return Err(LexError {
                            what: "string literal",
                            offset: start,
                        });
                    }
                    match bytes[i] {
                        b'\\' => i = (i + 2).min(len),
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str,
                    start,
                    end: i,
                });
            }
            b'`' => {
                tokens.push(Token {
                    kind: TokenKind::TemplateOpen,
                    start: i,
                    end: i + 1,
                });
                modes.push(Mode::Template { open: i });
                i += 1;
            }
            b'}' => {
                if let Some(Mode::Interp { braces, .. }) = modes.last_mut() {
                    if *braces == 0 {
                        tokens.push(Token {
                            kind: TokenKind::InterpClose,
                            start: i,
                            end: i + 1,
                        });
                        modes.pop();
                        i += 1;
                        continue;
                    }
                    *braces -= 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Punct,
                    start: i,
                    end: i + 1,
                });
                i += 1;
            }
            b'{' => {
                if let Some(Mode::Interp { braces, .. }) = modes.last_mut() {
                    *braces += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Punct,
                    start: i,
                    end: i + 1,
                });
                i += 1;
            }
            b if is_ident_start(b) => {
                let start = i;
                while i < len && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    start,
                    end: i,
                });
            }
            b if b.is_ascii_digit() => {
                let start = i;
                while i < len
                    && (is_ident_continue(bytes[i])
                        || (bytes[i] == b'.'
                            && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())))
                {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number,
                    start,
                    end: i,
                });
            }
            _ => {
                let rest = &src[i..];
                let width = PUNCT3
                    .iter()
                    .find(|p| rest.starts_with(**p))
                    .map(|p| p.len())
                    .or_else(|| {
                        PUNCT2
                            .iter()
                            .find(|p| rest.starts_with(**p))
                            .map(|p| p.len())
                    })
                    .unwrap_or_else(|| {
                        // Single byte, or an opaque multibyte character.
                        rest.chars().next().map(char::len_utf8).unwrap_or(1)
                    });
                tokens.push(Token {
                    kind: TokenKind::Punct,
                    start: i,
                    end: i + width,
                });
                i += width;
            }
        }
    }

    if let Some(mode) = modes.last() {
        let (what, offset) = match mode {
            Mode::Template { open } => ("template literal", *open),
            Mode::Interp { open, .. } => ("template interpolation", *open),
        };
        return Err(LexError { what, offset });
    }

    Ok(tokens)
}

/// Nesting depth assigned to each token: the depth the token itself sits at.
/// `(`/`[`/`{` and template/interpolation openers sit at the outer depth and
/// raise it; their closers sit back at the outer depth.
pub fn depths(tokens: &[Token], src: &str) -> Vec<u32> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut depth: u32 = 0;
    for token in tokens {
        match token.kind {
            TokenKind::Punct => match token.text(src) {
                "(" | "[" | "{" => {
                    out.push(depth);
                    depth += 1;
                }
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    out.push(depth);
                }
                _ => out.push(depth),
            },
            TokenKind::TemplateOpen | TokenKind::InterpOpen => {
                out.push(depth);
                depth += 1;
            }
            TokenKind::TemplateClose | TokenKind::InterpClose => {
                depth = depth.saturating_sub(1);
                out.push(depth);
            }
            _ => out.push(depth),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_plain_code() {
        let src = "let count = 0;";
        let tokens = lex(src).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text(src)).collect();
        assert_eq!(texts, vec!["let", "count", "=", "0", ";"]);
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[3].kind, TokenKind::Number);
    }

    #[test]
    fn multi_char_operators_are_single_tokens() {
        let src = "a += b ++ c => d === e";
        let tokens = lex(src).unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Punct)
            .map(|t| t.text(src))
            .collect();
        assert_eq!(ops, vec!["+=", "++", "=>", "==="]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // count\nb /* count */ c"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident]
        );
    }

    #[test]
    fn identifier_text_inside_strings_is_opaque() {
        let src = "\"count\" + 'count'";
        let tokens = lex(src).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[2].kind, TokenKind::Str);
    }

    #[test]
    fn template_with_interpolation_flattens() {
        let src = "html`<p>${count}</p>`";
        let tokens = lex(src).unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::TemplateOpen,
                TokenKind::TemplateChunk,
                TokenKind::InterpOpen,
                TokenKind::Ident,
                TokenKind::InterpClose,
                TokenKind::TemplateChunk,
                TokenKind::TemplateClose,
            ]
        );
        assert_eq!(tokens[4].text(src), "count");
    }

    #[test]
    fn interpolations_nest_braces_and_templates() {
        let src = "`${ f({a: 1}) } ${ `inner ${x}` }`";
        let tokens = lex(src).unwrap();
        assert_eq!(
            tokens
                .iter()
                .filter(|t| t.kind == TokenKind::InterpClose)
                .count(),
            3
        );
        assert_eq!(
            tokens
                .iter()
                .filter(|t| t.kind == TokenKind::TemplateClose)
                .count(),
            2
        );
    }

    #[test]
    fn depths_balance_around_groups() {
        let src = "f(a, { b: [c] })";
        let tokens = lex(src).unwrap();
        let d = depths(&tokens, src);
        // "c" sits three groups deep.
        let c_idx = tokens
            .iter()
            .position(|t| t.kind == TokenKind::Ident && t.text(src) == "c")
            .unwrap();
        assert_eq!(d[c_idx], 3);
        // Final ")" is back at depth 0.
        assert_eq!(*d.last().unwrap(), 0);
    }

    #[test]
    fn unterminated_template_is_an_error() {
        let err = lex("html`oops").unwrap_err();
        assert_eq!(err.what, "template literal");
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(lex("'oops").is_err());
    }
}
