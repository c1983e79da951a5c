//! Recursive-descent tree builder over the classified segment stream

use crate::error::ParseError;
use crate::parser::ast::{BlockKind, Node, Span};
use crate::parser::lexer::{segment, split_for_clause, strip_keyword, Segment, SegmentKind, TagKind};

/// Parse template source into a node tree. The root is always a
/// [`Node::Group`]; the only fatal outcomes are an `if`/`for` block left
/// open at end of input and structurally malformed `let`/`include`/block
/// tags.
pub fn parse(source: &str) -> Result<Node, ParseError> {
    let segments = segment(source);
    let mut builder = TreeBuilder {
        source,
        segments,
        pos: 0,
    };
    let children = builder.block(None)?;
    Ok(Node::Group(children))
}

struct TreeBuilder<'src> {
    source: &'src str,
    segments: Vec<Segment<'src>>,
    pos: usize,
}

impl<'src> TreeBuilder<'src> {
    /// Parse a run of sibling nodes. At top level (`stop == None`) this
    /// consumes the whole input and orphaned block markers pass through
    /// as literal text. Inside a block it returns with the cursor parked
    /// on the block's own end marker (or branch marker), and raises an
    /// unterminated-block fault if input runs out first.
    fn block(&mut self, stop: Option<(BlockKind, Span)>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while self.pos < self.segments.len() {
            let seg = self.segments[self.pos];
            let raw = seg.raw(self.source);
            let span = seg.span.0..seg.span.1;
            match seg.kind {
                SegmentKind::Text(content) => {
                    text.push_str(content);
                    self.pos += 1;
                }
                SegmentKind::Expr(body) => {
                    flush_text(&mut nodes, &mut text);
                    nodes.push(Node::Expr(body.to_string()));
                    self.pos += 1;
                }
                SegmentKind::Tag(kind, body) => match kind {
                    TagKind::Let => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(let_node(body, span)?);
                        self.pos += 1;
                    }
                    TagKind::Safe => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(Node::Safe(strip_keyword(body, "safe").to_string()));
                        self.pos += 1;
                    }
                    TagKind::Include => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(include_node(body, span)?);
                        self.pos += 1;
                    }
                    // Block openers are only honored when their end tag
                    // exists somewhere later; otherwise they are text.
                    TagKind::If if self.has_later(TagKind::EndIf) => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(self.if_block(body, span)?);
                    }
                    TagKind::For if self.has_later(TagKind::EndFor) => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(self.for_block(body, span)?);
                    }
                    TagKind::Comment if self.has_later(TagKind::EndComment) => {
                        self.pos += 1;
                        self.skip_comment();
                    }
                    TagKind::EndIf | TagKind::Else
                        if matches!(stop, Some((BlockKind::If, _))) =>
                    {
                        break;
                    }
                    TagKind::EndFor | TagKind::Empty
                        if matches!(stop, Some((BlockKind::For, _))) =>
                    {
                        break;
                    }
                    // Orphaned markers and unpaired openers are literal.
                    _ => {
                        text.push_str(raw);
                        self.pos += 1;
                    }
                },
            }
        }

        if let Some((kind, open_span)) = stop {
            if self.pos >= self.segments.len() {
                return Err(ParseError::UnterminatedBlock {
                    kind,
                    span: open_span,
                });
            }
        }
        flush_text(&mut nodes, &mut text);
        Ok(nodes)
    }

    /// Parse an `if` block starting at the current opening tag. The
    /// cursor pre-check guarantees an `end if` exists later in the
    /// suffix, but a nested `if` may claim it; running out of input is
    /// then the unterminated-block fault.
    fn if_block(&mut self, body: &str, open_span: Span) -> Result<Node, ParseError> {
        let condition = strip_keyword(body, "if").to_string();
        self.pos += 1;

        let then_children = self.block(Some((BlockKind::If, open_span.clone())))?;
        let mut else_children = Vec::new();
        if self.at_tag(TagKind::Else) {
            self.pos += 1;
            else_children = self.block(Some((BlockKind::If, open_span)))?;
            if self.at_tag(TagKind::Else) {
                return Err(ParseError::MalformedTag {
                    tag: "if",
                    message: "more than one else marker in one if block".to_string(),
                    span: self.current_span(),
                });
            }
        }
        // Cursor is parked on this block's end tag.
        self.pos += 1;
        Ok(Node::If {
            condition,
            then_children,
            else_children,
        })
    }

    fn for_block(&mut self, body: &str, open_span: Span) -> Result<Node, ParseError> {
        let clause = strip_keyword(body, "for");
        let (head, tail) = split_for_clause(clause).ok_or_else(|| ParseError::MalformedTag {
            tag: "for",
            message: "expected `for name[, name...] in expression`".to_string(),
            span: open_span.clone(),
        })?;
        let vars = head
            .split(',')
            .map(str::trim)
            .map(|name| {
                if name.is_empty() {
                    Err(ParseError::MalformedTag {
                        tag: "for",
                        message: "empty loop variable name".to_string(),
                        span: open_span.clone(),
                    })
                } else {
                    Ok(name.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let iterable = tail.trim().to_string();
        if iterable.is_empty() {
            return Err(ParseError::MalformedTag {
                tag: "for",
                message: "missing iterable expression".to_string(),
                span: open_span,
            });
        }
        self.pos += 1;

        let body_children = self.block(Some((BlockKind::For, open_span.clone())))?;
        let mut empty_children = Vec::new();
        if self.at_tag(TagKind::Empty) {
            self.pos += 1;
            empty_children = self.block(Some((BlockKind::For, open_span)))?;
            if self.at_tag(TagKind::Empty) {
                return Err(ParseError::MalformedTag {
                    tag: "for",
                    message: "more than one empty marker in one for block".to_string(),
                    span: self.current_span(),
                });
            }
        }
        self.pos += 1;
        Ok(Node::For {
            vars,
            iterable,
            body: body_children,
            empty: empty_children,
        })
    }

    /// Consume everything through the next `end comment` tag. Comment
    /// blocks fully elide their content, including any tags inside.
    fn skip_comment(&mut self) {
        while self.pos < self.segments.len() {
            let is_end = matches!(
                self.segments[self.pos].kind,
                SegmentKind::Tag(TagKind::EndComment, _)
            );
            self.pos += 1;
            if is_end {
                break;
            }
        }
    }

    fn has_later(&self, kind: TagKind) -> bool {
        self.segments[self.pos + 1..]
            .iter()
            .any(|seg| matches!(seg.kind, SegmentKind::Tag(k, _) if k == kind))
    }

    fn at_tag(&self, kind: TagKind) -> bool {
        self.segments
            .get(self.pos)
            .is_some_and(|seg| matches!(seg.kind, SegmentKind::Tag(k, _) if k == kind))
    }

    fn current_span(&self) -> Span {
        self.segments
            .get(self.pos)
            .map(|seg| seg.span.0..seg.span.1)
            .unwrap_or(self.source.len()..self.source.len())
    }
}

fn flush_text(nodes: &mut Vec<Node>, text: &mut String) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

fn let_node(body: &str, span: Span) -> Result<Node, ParseError> {
    let rest = strip_keyword(body, "let");
    let malformed = || ParseError::MalformedTag {
        tag: "let",
        message: "expected `let name = expression`".to_string(),
        span: span.clone(),
    };
    let (target, expr) = rest.split_once('=').ok_or_else(malformed)?;
    let target = target.trim();
    let expr = expr.trim();
    if target.is_empty() || expr.is_empty() {
        return Err(malformed());
    }
    Ok(Node::Let {
        target: target.to_string(),
        expr: expr.to_string(),
    })
}

fn include_node(body: &str, span: Span) -> Result<Node, ParseError> {
    let rest = strip_keyword(body, "include");
    let mut parts = rest.split_whitespace();
    let template = parts
        .next()
        .map(|name| name.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ParseError::MalformedTag {
            tag: "include",
            message: "missing template name".to_string(),
            span: span.clone(),
        })?;
    let mut bindings = Vec::new();
    for part in parts {
        let (name, expr) = part.split_once('=').ok_or_else(|| ParseError::MalformedTag {
            tag: "include",
            message: format!("argument `{}` is not of the form name=expression", part),
            span: span.clone(),
        })?;
        if name.is_empty() || expr.is_empty() {
            return Err(ParseError::MalformedTag {
                tag: "include",
                message: format!("argument `{}` is not of the form name=expression", part),
                span: span.clone(),
            });
        }
        bindings.push((name.to_string(), expr.to_string()));
    }
    Ok(Node::Include { template, bindings })
}
