//! Raw template lexer using logos
//!
//! One forward scan splits the source into literal text and delimited
//! tags. A `{{`/`{%` opener only becomes a tag when its closer exists in
//! the remaining input and (for `{%`) the body matches a known keyword;
//! otherwise the opener falls back to literal text and scanning resumes
//! right after it, so tags inside a malformed tag are still recognized.

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
enum RawToken {
    #[token("{{")]
    ExprOpen,

    #[token("{%")]
    TagOpen,

    #[regex(r"[^{]+")]
    Text,

    #[token("{")]
    Brace,
}

/// What a `{% ... %}` tag's body says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    If,
    Else,
    EndIf,
    For,
    Empty,
    EndFor,
    Let,
    Safe,
    Include,
    Comment,
    EndComment,
}

impl TagKind {
    /// Classify a tag body (text between `{%` and `%}`). `None` means
    /// the tag matches no keyword and should pass through as text.
    pub fn classify(body: &str) -> Option<TagKind> {
        let trimmed = body.trim();
        match trimmed {
            "else" => return Some(TagKind::Else),
            "empty" => return Some(TagKind::Empty),
            "comment" => return Some(TagKind::Comment),
            _ => {}
        }
        if let Some(rest) = trimmed.strip_prefix("end") {
            return match rest.trim() {
                "if" => Some(TagKind::EndIf),
                "for" => Some(TagKind::EndFor),
                "comment" => Some(TagKind::EndComment),
                _ => None,
            };
        }
        if starts_with_keyword(trimmed, "include") {
            return Some(TagKind::Include);
        }
        if starts_with_keyword(trimmed, "let") {
            return Some(TagKind::Let);
        }
        if starts_with_keyword(trimmed, "safe") {
            return Some(TagKind::Safe);
        }
        if starts_with_keyword(trimmed, "if") {
            return Some(TagKind::If);
        }
        if starts_with_keyword(trimmed, "for") {
            // A for tag must carry a standalone `in`.
            let clause = strip_keyword(trimmed, "for");
            if split_for_clause(clause).is_some() {
                return Some(TagKind::For);
            }
        }
        None
    }
}

/// True when `body` starts with `keyword` followed by a word boundary.
fn starts_with_keyword(body: &str, keyword: &str) -> bool {
    body.strip_prefix(keyword)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Strip a leading keyword from a tag body, returning the trimmed rest.
/// Only the leading keyword token is removed, never occurrences inside
/// identifiers or expressions.
pub(crate) fn strip_keyword<'a>(body: &'a str, keyword: &str) -> &'a str {
    body.trim()
        .strip_prefix(keyword)
        .map(str::trim)
        .unwrap_or("")
}

/// Split a for clause (everything after the `for` keyword) at its first
/// standalone `in` word: `x, y in pairs` → (`x, y`, `pairs`). Returns
/// `None` when no such `in` exists, in which case the tag is not a for
/// tag at all.
pub(crate) fn split_for_clause(clause: &str) -> Option<(&str, &str)> {
    let mut search = 0;
    while let Some(found) = clause[search..].find("in") {
        let at = search + found;
        let before_ws = clause[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = &clause[at + 2..];
        let after_ws = after.chars().next().is_some_and(char::is_whitespace);
        if at > 0 && before_ws && after_ws {
            return Some((&clause[..at], after));
        }
        search = at + 2;
    }
    None
}

/// A classified region of the source: a literal text run, an expression
/// tag, or a statement tag. Bodies are verbatim slices of the source;
/// `span` covers the full region including delimiters so unrecognized
/// markers can be re-emitted literally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment<'src> {
    pub kind: SegmentKind<'src>,
    pub span: (usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind<'src> {
    Text(&'src str),
    Expr(&'src str),
    Tag(TagKind, &'src str),
}

impl<'src> Segment<'src> {
    pub fn raw(&self, source: &'src str) -> &'src str {
        &source[self.span.0..self.span.1]
    }
}

/// Split the source into classified segments in one forward scan.
pub fn segment(source: &str) -> Vec<Segment<'_>> {
    let mut lex = RawToken::lexer(source);
    let mut segments = Vec::new();
    // Pending literal run, as a byte range; runs are always contiguous.
    let mut run: Option<(usize, usize)> = None;

    while let Some(token) = lex.next() {
        let span = lex.span();
        match token {
            Ok(RawToken::ExprOpen) => {
                let tail = lex.remainder();
                match tail.find("}}") {
                    Some(close) => {
                        let body = &tail[..close];
                        lex.bump(close + 2);
                        flush_run(source, &mut run, &mut segments);
                        segments.push(Segment {
                            kind: SegmentKind::Expr(body),
                            span: (span.start, lex.span().end),
                        });
                    }
                    None => extend_run(&mut run, span.start, span.end),
                }
            }
            Ok(RawToken::TagOpen) => {
                let tail = lex.remainder();
                match tail.find("%}") {
                    Some(close) => {
                        let body = &tail[..close];
                        match TagKind::classify(body) {
                            Some(kind) => {
                                lex.bump(close + 2);
                                flush_run(source, &mut run, &mut segments);
                                segments.push(Segment {
                                    kind: SegmentKind::Tag(kind, body),
                                    span: (span.start, lex.span().end),
                                });
                            }
                            // Unknown tag: only the `{%` becomes text and
                            // the body is rescanned for nested tags.
                            None => extend_run(&mut run, span.start, span.end),
                        }
                    }
                    None => extend_run(&mut run, span.start, span.end),
                }
            }
            Ok(RawToken::Text) | Ok(RawToken::Brace) | Err(_) => {
                extend_run(&mut run, span.start, span.end);
            }
        }
    }
    flush_run(source, &mut run, &mut segments);
    segments
}

fn extend_run(run: &mut Option<(usize, usize)>, start: usize, end: usize) {
    match run {
        Some((_, run_end)) => *run_end = end,
        None => *run = Some((start, end)),
    }
}

fn flush_run<'src>(
    source: &'src str,
    run: &mut Option<(usize, usize)>,
    segments: &mut Vec<Segment<'src>>,
) {
    if let Some((start, end)) = run.take() {
        segments.push(Segment {
            kind: SegmentKind::Text(&source[start..end]),
            span: (start, end),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds<'a>(segments: &[Segment<'a>]) -> Vec<SegmentKind<'a>> {
        segments.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_plain_text_is_one_segment() {
        let segs = segment("hello there");
        assert_eq!(kinds(&segs), vec![SegmentKind::Text("hello there")]);
    }

    #[test]
    fn test_expression_tag() {
        let segs = segment("a{{ name }}b");
        assert_eq!(
            kinds(&segs),
            vec![
                SegmentKind::Text("a"),
                SegmentKind::Expr(" name "),
                SegmentKind::Text("b"),
            ]
        );
        assert_eq!(segs[1].span, (1, 11));
    }

    #[test]
    fn test_statement_tags_classified() {
        let segs = segment("{% if x %}{%else%}{%  end if  %}{% end for %}{% empty %}");
        assert_eq!(
            segs.iter()
                .map(|s| match s.kind {
                    SegmentKind::Tag(kind, _) => kind,
                    other => panic!("unexpected segment {:?}", other),
                })
                .collect::<Vec<_>>(),
            vec![
                TagKind::If,
                TagKind::Else,
                TagKind::EndIf,
                TagKind::EndFor,
                TagKind::Empty,
            ]
        );
    }

    #[test]
    fn test_endif_without_space() {
        assert_eq!(TagKind::classify(" endif "), Some(TagKind::EndIf));
        assert_eq!(TagKind::classify("end   comment"), Some(TagKind::EndComment));
        assert_eq!(TagKind::classify("endless"), None);
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert_eq!(TagKind::classify("iffy x"), None);
        assert_eq!(TagKind::classify("lettuce"), None);
        assert_eq!(TagKind::classify("let x = 1"), Some(TagKind::Let));
        assert_eq!(TagKind::classify("safely"), None);
        assert_eq!(TagKind::classify("safe x"), Some(TagKind::Safe));
    }

    #[test]
    fn test_for_requires_standalone_in() {
        assert_eq!(TagKind::classify("for x in items"), Some(TagKind::For));
        assert_eq!(TagKind::classify("for x index"), None);
        assert_eq!(TagKind::classify("for inside"), None);
    }

    #[test]
    fn test_split_for_clause_skips_in_inside_words() {
        assert_eq!(split_for_clause("x index in items"), Some(("x index ", " items")));
        assert_eq!(split_for_clause("x in [1, 2]"), Some(("x ", " [1, 2]")));
        assert_eq!(split_for_clause("input"), None);
    }

    #[test]
    fn test_unclosed_expression_is_text() {
        let segs = segment("oops {{ name");
        assert_eq!(kinds(&segs), vec![SegmentKind::Text("oops {{ name")]);
    }

    #[test]
    fn test_unknown_tag_rescans_body() {
        // The `{%` falls back to text but the inner expression is kept.
        let segs = segment("{% bogus {{ x }} %}");
        assert_eq!(
            kinds(&segs),
            vec![
                SegmentKind::Text("{% bogus "),
                SegmentKind::Expr(" x "),
                SegmentKind::Text(" %}"),
            ]
        );
    }

    #[test]
    fn test_lone_braces_are_text() {
        let segs = segment("a { b } c {");
        assert_eq!(kinds(&segs), vec![SegmentKind::Text("a { b } c {")]);
    }

    #[test]
    fn test_tags_across_line_breaks() {
        let segs = segment("{% if\n  ready %}x{% end\nif %}");
        assert!(matches!(segs[0].kind, SegmentKind::Tag(TagKind::If, _)));
        assert!(matches!(segs[2].kind, SegmentKind::Tag(TagKind::EndIf, _)));
    }
}
