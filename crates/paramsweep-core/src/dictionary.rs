//! Minimal tokenizer for brace-structured solver dictionaries.
//!
//! Recognizes words, quoted strings, `{ } ( ) ;`, `#` directives and skips
//! comments. That is enough to locate a named entry and its brace group by
//! exact token, without interpreting the values inside.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Quoted,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Semicolon,
    /// `#include "file"`, `#remove name` or a `#{ ... #}` code block. A
    /// complete statement on its own.
    Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the source text.
    pub span: Range<usize>,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }
}

/// A named entry followed by its brace-delimited group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Span of the name token.
    pub name: Range<usize>,
    /// Span of the group from `{` through the matching `}`.
    pub group: Range<usize>,
}

/// Split `source` into tokens. Unterminated comments and strings run to end of input.
pub fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b if b.is_ascii_whitespace() => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            b'"' => {
                let start = i;
                i = skip_quoted(bytes, i);
                tokens.push(Token {
                    kind: TokenKind::Quoted,
                    span: start..i,
                });
            }
            b'#' => {
                let start = i;
                i = skip_directive(bytes, i);
                tokens.push(Token {
                    kind: TokenKind::Directive,
                    span: start..i,
                });
            }
            b'{' | b'}' | b'(' | b')' | b';' => {
                let kind = match b {
                    b'{' => TokenKind::OpenBrace,
                    b'}' => TokenKind::CloseBrace,
                    b'(' => TokenKind::OpenParen,
                    b')' => TokenKind::CloseParen,
                    _ => TokenKind::Semicolon,
                };
                tokens.push(Token {
                    kind,
                    span: i..i + 1,
                });
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_delimiter(bytes, i) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    span: start..i,
                });
            }
        }
    }

    tokens
}

/// End of the quoted string opening at `i`.
fn skip_quoted(bytes: &[u8], mut i: usize) -> usize {
    i += 1;
    while i < bytes.len() && bytes[i] != b'"' {
        if bytes[i] == b'\\' {
            i += 1;
        }
        i += 1;
    }
    (i + 1).min(bytes.len())
}

/// End of the directive starting at `i`: a `#{ ... #}` block, or `#name`
/// plus one argument on the same line.
fn skip_directive(bytes: &[u8], mut i: usize) -> usize {
    if bytes.get(i + 1) == Some(&b'{') {
        i += 2;
        while i < bytes.len() && !(bytes[i] == b'#' && bytes.get(i + 1) == Some(&b'}')) {
            i += 1;
        }
        return (i + 2).min(bytes.len());
    }

    i += 1;
    while i < bytes.len() && !is_delimiter(bytes, i) {
        i += 1;
    }
    let name_end = i;

    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'"') => skip_quoted(bytes, i),
        Some(_) if !is_delimiter(bytes, i) => {
            while i < bytes.len() && !is_delimiter(bytes, i) {
                i += 1;
            }
            i
        }
        _ => name_end,
    }
}

fn is_delimiter(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b if b.is_ascii_whitespace() => true,
        b'{' | b'}' | b'(' | b')' | b';' | b'"' => true,
        b'/' => matches!(bytes.get(i + 1), Some(b'/') | Some(b'*')),
        _ => false,
    }
}

/// Outcome of [`find_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Entry),
    Missing,
    /// An entry with this name opens a group that never closes.
    Unbalanced { at: usize },
}

/// Find the first entry named exactly `name` that opens a brace group.
///
/// The name must sit in key position: first token, or directly after `;`,
/// `{`, `}` or a directive.
pub fn find_entry(source: &str, tokens: &[Token], name: &str) -> Lookup {
    for (idx, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Word || token.text(source) != name {
            continue;
        }
        let key_position = idx == 0
            || matches!(
                tokens[idx - 1].kind,
                TokenKind::Semicolon
                    | TokenKind::OpenBrace
                    | TokenKind::CloseBrace
                    | TokenKind::Directive
            );
        if !key_position {
            continue;
        }
        let Some(open) = tokens.get(idx + 1) else {
            continue;
        };
        if open.kind != TokenKind::OpenBrace {
            continue;
        }

        let mut depth = 0usize;
        for close in &tokens[idx + 1..] {
            match close.kind {
                TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Lookup::Found(Entry {
                            name: token.span.clone(),
                            group: open.span.start..close.span.end,
                        });
                    }
                }
                _ => {}
            }
        }
        return Lookup::Unbalanced {
            at: token.span.start,
        };
    }

    Lookup::Missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(source: &str) -> Vec<&str> {
        tokenize(source)
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text(source))
            .collect()
    }

    #[test]
    fn test_tokenize_skips_comments() {
        let src = "// inlet1 here\nwall /* inlet1 */ { type noSlip; }";
        assert_eq!(words(src), vec!["wall", "type", "noSlip"]);
    }

    #[test]
    fn test_tokenize_value_line() {
        let src = "value uniform (0.1 -0.2 0);";
        let kinds: Vec<TokenKind> = tokenize(src).iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::OpenParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::CloseParen,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_tokenize_quoted() {
        let src = "\"inlet1\" { }";
        let tokens = tokenize(src);
        assert_eq!(tokens[0].kind, TokenKind::Quoted);
        assert_eq!(tokens[0].text(src), "\"inlet1\"");
    }

    #[test]
    fn test_find_entry_exact_token() {
        let src = "boundaryField\n{\n    inlet10\n    {\n        type zeroGradient;\n    }\n    inlet1\n    {\n        type zeroGradient;\n    }\n}\n";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert_eq!(&src[entry.name.clone()], "inlet1");
        assert!(src[entry.group.clone()].starts_with('{'));
        assert!(src[entry.group.clone()].ends_with('}'));
        assert!(entry.name.start > src.find("inlet10").unwrap());
    }

    #[test]
    fn test_find_entry_skips_non_key_occurrence() {
        let src = "note inlet1;\ninlet1 { type fixedValue; }\n";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert_eq!(entry.name.start, src.rfind("inlet1").unwrap());
    }

    #[test]
    fn test_find_entry_nested_group() {
        let src = "inlet1 { sub { a 1; } b 2; } tail;";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert_eq!(&src[entry.group], "{ sub { a 1; } b 2; }");
    }

    #[test]
    fn test_find_entry_missing_and_unbalanced() {
        let src = "outlet { type zeroGradient; }";
        assert_eq!(find_entry(src, &tokenize(src), "inlet1"), Lookup::Missing);

        let broken = "inlet1 { type fixedValue;";
        assert_eq!(
            find_entry(broken, &tokenize(broken), "inlet1"),
            Lookup::Unbalanced { at: 0 }
        );
    }

    #[test]
    fn test_tokenize_directives() {
        let src = "#includeEtc \"caseDicts/setConstraintTypes\"\n#remove inlet1\n#{ code { x; } #}\nwall";
        let tokens = tokenize(src);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Directive,
                TokenKind::Directive,
                TokenKind::Directive,
                TokenKind::Word,
            ]
        );
        assert_eq!(tokens[0].text(src), "#includeEtc \"caseDicts/setConstraintTypes\"");
        assert_eq!(tokens[1].text(src), "#remove inlet1");
    }

    #[test]
    fn test_find_entry_after_include_directive() {
        let src = "boundaryField\n{\n    #includeEtc \"caseDicts/setConstraintTypes\"\n    inlet1\n    {\n        type zeroGradient;\n    }\n}\n";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert_eq!(entry.name.start, src.find("inlet1").unwrap());
    }

    #[test]
    fn test_find_entry_with_macro_and_directive_inside_group() {
        let src = "inlet1\n{\n    $fixedInlet;\n    #include \"include/inletValue\"\n}\noutlet { type zeroGradient; }\n";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert!(src[entry.group.clone()].contains("$fixedInlet;"));
        assert!(src[entry.group].ends_with("\"include/inletValue\"\n}"));
    }

    #[test]
    fn test_find_entry_crlf() {
        let src = "boundaryField\r\n{\r\n    inlet1\r\n    {\r\n        type zeroGradient;\r\n    }\r\n}\r\n";
        let tokens = tokenize(src);
        let Lookup::Found(entry) = find_entry(src, &tokens, "inlet1") else {
            panic!("inlet1 not found");
        };
        assert_eq!(&src[entry.name], "inlet1");
    }
}
