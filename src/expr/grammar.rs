//! Expression parser using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::expr::ast::{BinOp, Expr, UnaryOp};
use crate::expr::eval::EvalError;
use crate::expr::lexer::{self, Token};

/// One postfix operation applied to a primary expression
#[derive(Debug, Clone)]
enum Postfix {
    Attr(String),
    Index(Expr),
    Call(Vec<Expr>),
}

/// Parse expression source into an AST
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let len = input.len();
    let tokens = lexer::lex(input)?;

    let token_stream = Stream::from_iter(
        tokens.into_iter().map(|(tok, span)| (tok, span.into())),
    )
    // Split (Token, SimpleSpan) into token and span parts
    .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| syntax_error(&errs))
}

/// Collapse chumsky's rich errors into a single syntax fault message
fn syntax_error(errs: &[Rich<'_, Token>]) -> EvalError {
    let Some(err) = errs.first() else {
        return EvalError::Syntax("invalid expression".to_string());
    };
    let found = match err.found() {
        Some(tok) => format_token(tok),
        None => "end of input".to_string(),
    };
    let expected: Vec<String> = err
        .expected()
        .filter_map(|e| match e {
            chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
            chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
            chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
            chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
            chumsky::error::RichPattern::Any => Some("any token".to_string()),
            chumsky::error::RichPattern::SomethingElse => None,
        })
        .collect();
    if expected.is_empty() {
        EvalError::Syntax(format!("unexpected {}", found))
    } else {
        EvalError::Syntax(format!(
            "unexpected {}, expected {}",
            found,
            expected.join(", ")
        ))
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Not => "'not'".to_string(),
        Token::In => "'in'".to_string(),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::EqEq => "'=='".to_string(),
        Token::NotEq => "'!='".to_string(),
        Token::LessEq => "'<='".to_string(),
        Token::GreaterEq => "'>='".to_string(),
        Token::Less => "'<'".to_string(),
        Token::Greater => "'>'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Percent => "'%'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dot => "'.'".to_string(),
    }
}

fn fold_binary((first, rest): (Expr, Vec<(BinOp, Expr)>)) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(Box::new(lhs), op, Box::new(rhs))
    })
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::Str(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
        };

        let ident = select! {
            Token::Ident(s) => s,
        };

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let atom = choice((
            literal,
            list,
            ident.clone().map(Expr::Var),
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        // Postfix chain: attribute access, subscript, call
        let call_args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(Postfix::Call);
        let subscript = expr
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Postfix::Index);
        let attr = just(Token::Dot).ignore_then(ident).map(Postfix::Attr);

        let postfixed = atom
            .then(choice((call_args, subscript, attr)).repeated().collect::<Vec<_>>())
            .map(|(base, ops)| {
                ops.into_iter().fold(base, |acc, op| match op {
                    Postfix::Attr(name) => Expr::Attr(Box::new(acc), name),
                    Postfix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
                    Postfix::Call(args) => Expr::Call {
                        callee: Box::new(acc),
                        args,
                    },
                })
            });

        let negated = just(Token::Minus)
            .to(UnaryOp::Neg)
            .repeated()
            .collect::<Vec<_>>()
            .then(postfixed)
            .map(|(ops, inner)| {
                ops.into_iter()
                    .rev()
                    .fold(inner, |acc, op| Expr::Unary(op, Box::new(acc)))
            });

        let product_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::Slash).to(BinOp::Div),
            just(Token::Percent).to(BinOp::Mod),
        ));
        let product = negated
            .clone()
            .then(product_op.then(negated).repeated().collect::<Vec<_>>())
            .map(fold_binary);

        let sum_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));
        let sum = product
            .clone()
            .then(sum_op.then(product).repeated().collect::<Vec<_>>())
            .map(fold_binary);

        // `not in` must be tried before plain `in`
        let compare_op = choice((
            just(Token::EqEq).to(BinOp::Eq),
            just(Token::NotEq).to(BinOp::Ne),
            just(Token::LessEq).to(BinOp::Le),
            just(Token::GreaterEq).to(BinOp::Ge),
            just(Token::Less).to(BinOp::Lt),
            just(Token::Greater).to(BinOp::Gt),
            just(Token::Not).ignore_then(just(Token::In)).to(BinOp::NotIn),
            just(Token::In).to(BinOp::In),
        ));
        let comparison = sum
            .clone()
            .then(compare_op.then(sum).repeated().collect::<Vec<_>>())
            .map(fold_binary);

        let inverted = just(Token::Not)
            .to(UnaryOp::Not)
            .repeated()
            .collect::<Vec<_>>()
            .then(comparison)
            .map(|(ops, inner)| {
                ops.into_iter()
                    .rev()
                    .fold(inner, |acc, op| Expr::Unary(op, Box::new(acc)))
            });

        let conjunction = inverted
            .clone()
            .then(
                just(Token::And)
                    .to(BinOp::And)
                    .then(inverted)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(fold_binary);

        conjunction
            .clone()
            .then(
                just(Token::Or)
                    .to(BinOp::Or)
                    .then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(fold_binary)
    })
}
