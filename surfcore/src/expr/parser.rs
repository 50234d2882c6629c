//! Parser for property expressions using chumsky.
//!
//! Two stages:
//! 1) Tokenisation from input string to a `Token` stream.
//! 2) Parsing tokens into an [`Expr`] tree.
//!
//! The grammar is closed: besides literals, operators and parentheses the only
//! callable names are `prop`, `osc`, `bind`, `url` and the `math.` namespace.
//! There are no other identifiers, no member access, no assignment, no braces
//! and no function literals, so anything outside that set fails to parse.
//!
//! Precedence, loosest first: `?:` < `??` < `||` < `&&` < equality < relational
//! < additive < multiplicative < `**` (right-assoc) < unary < indexing < atoms.
use std::str::FromStr;

use chumsky::{input::ValueInput, prelude::*};

use crate::expr::{
    ast::{BinaryOp, Callee, Expr, LogicalOp, UnaryOp},
    math::{MathConst, MathFn},
};
use surfprop::value::Value;

pub type Spanned<T> = (T, SimpleSpan);
type Span = SimpleSpan;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    // Delimiters & punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Bang,
    EqEq,
    StrictEq,
    NotEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Nullish,

    // Keywords
    True,
    False,
    Null,
    Undefined,
    Prop,
    Osc,
    Bind,
    Url,
    Math,

    // Literals & names
    Num(String),
    Str(String),
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::StarStar => write!(f, "**"),
            Token::Bang => write!(f, "!"),
            Token::EqEq => write!(f, "=="),
            Token::StrictEq => write!(f, "==="),
            Token::NotEq => write!(f, "!="),
            Token::StrictNe => write!(f, "!=="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Nullish => write!(f, "??"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Undefined => write!(f, "undefined"),
            Token::Prop => write!(f, "prop"),
            Token::Osc => write!(f, "osc"),
            Token::Bind => write!(f, "bind"),
            Token::Url => write!(f, "url"),
            Token::Math => write!(f, "math"),
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Ident(name) => write!(f, "{name}"),
        }
    }
}

// ---------------- Lexer ----------------

fn lexer<'a>() -> impl Parser<'a, &'a str, Vec<Spanned<Token>>, extra::Err<Rich<'a, char>>> {
    // Multi-char operators first to avoid prefix capture
    let op = choice((
        just("===").to(Token::StrictEq),
        just("!==").to(Token::StrictNe),
        just("**").to(Token::StarStar),
        just("??").to(Token::Nullish),
        just("||").to(Token::OrOr),
        just("&&").to(Token::AndAnd),
        just("==").to(Token::EqEq),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
    ));

    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .or(just('.').then(text::digits(10)).to_slice())
        .then(exponent.or_not())
        .to_slice()
        .map(|s: &str| Token::Num(s.to_string()))
        .labelled("number");

    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('\''),
        just('"'),
        just('/'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
    )));
    let single_quoted = none_of("\\'")
        .or(escape.clone())
        .repeated()
        .collect::<String>()
        .delimited_by(just('\''), just('\''));
    let double_quoted = none_of("\\\"")
        .or(escape)
        .repeated()
        .collect::<String>()
        .delimited_by(just('"'), just('"'));
    let string = single_quoted
        .or(double_quoted)
        .map(Token::Str)
        .labelled("string");

    let word = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_' || *c == '$')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
                .repeated(),
        )
        .to_slice()
        .map(|s: &str| match s {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "prop" => Token::Prop,
            "osc" => Token::Osc,
            "bind" => Token::Bind,
            "url" => Token::Url,
            "math" | "Math" => Token::Math,
            _ => Token::Ident(s.to_string()),
        });

    let punct = choice((
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('?').to(Token::Question),
        just(':').to(Token::Colon),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
        just('!').to(Token::Bang),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));

    let token = choice((op, number, string, word, punct));

    token
        .map_with(|tok, e| (tok, e.span()))
        .padded()
        .repeated()
        .collect()
        .then_ignore(end())
}

// ---------------- chumsky parser over tokens ----------------

fn check_call<'tokens>(
    callee: Callee,
    args: Vec<Expr>,
    span: Span,
) -> Result<Expr, Rich<'tokens, Token, Span>> {
    let (min, max) = callee.arity();
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        return Err(Rich::custom(
            span,
            format!(
                "'{}' expects {expected} argument(s), found {}",
                callee.name(),
                args.len()
            ),
        ));
    }
    Ok(Expr::Call(callee, args))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn logical(op: LogicalOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Logical(op, Box::new(lhs), Box::new(rhs))
}

fn expr_parser<'tokens, I>()
-> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let number = select! { Token::Num(n) => n }.try_map(|n: String, span| {
            n.parse::<f64>()
                .map(|v| Expr::Literal(Value::number(v)))
                .map_err(|_| Rich::custom(span, format!("invalid number literal '{n}'")))
        });

        let value = select! {
            Token::Str(s) => Expr::Literal(Value::Str(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Undefined => Expr::Literal(Value::Null),
        };

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        let args = list
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .labelled("arguments");

        let array = list
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::Array)
            .labelled("array");

        let resolver = select! {
            Token::Prop => Callee::Prop,
            Token::Osc => Callee::Osc,
            Token::Bind => Callee::Bind,
            Token::Url => Callee::Url,
        }
        .then(args.clone())
        .try_map(|(callee, args), span| check_call(callee, args, span))
        .labelled("resolver call");

        let math = just(Token::Math)
            .ignore_then(just(Token::Dot))
            .ignore_then(select! { Token::Ident(name) => name })
            .then(args.or_not())
            .try_map(|(name, args): (String, Option<Vec<Expr>>), span| match args {
                Some(args) => {
                    let function = MathFn::from_str(&name).map_err(|_| {
                        Rich::custom(span, format!("unknown function 'math.{name}'"))
                    })?;
                    check_call(Callee::Math(function), args, span)
                }
                None => MathConst::from_str(&name)
                    .map(Expr::MathConst)
                    .map_err(|_| Rich::custom(span, format!("unknown constant 'math.{name}'"))),
            })
            .labelled("math");

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .labelled("parentheses");

        let atom = number
            .or(value)
            .or(array)
            .or(resolver)
            .or(math)
            .or(paren)
            .labelled("atom")
            .boxed();

        // Indexing: `list[0]`, left-assoc, binds tightest
        let postfix = atom
            .foldl(
                expr.clone()
                    .delimited_by(just(Token::LBracket), just(Token::RBracket))
                    .repeated(),
                |base, index| Expr::Index(Box::new(base), Box::new(index)),
            )
            .labelled("index");

        let unary = choice((
            just(Token::Bang).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Plus).to(UnaryOp::Plus),
        ))
        .repeated()
        .foldr(postfix, |op, rhs| Expr::Unary(op, Box::new(rhs)))
        .boxed();

        // Exponentiation is right-assoc
        let power = recursive(|pow| {
            unary
                .clone()
                .then(just(Token::StarStar).ignore_then(pow).or_not())
                .map(|(base, exp)| match exp {
                    Some(exp) => binary(BinaryOp::Pow, base, exp),
                    None => base,
                })
                .labelled("power")
        });

        let term = power
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(power)
                .repeated(),
                |a, (op, b)| binary(op, a, b),
            )
            .labelled("term");

        let additive = term
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(term)
                .repeated(),
                |a, (op, b)| binary(op, a, b),
            )
            .labelled("additive")
            .boxed();

        let relational = additive
            .clone()
            .foldl(
                choice((
                    just(Token::Le).to(BinaryOp::Le),
                    just(Token::Ge).to(BinaryOp::Ge),
                    just(Token::Lt).to(BinaryOp::Lt),
                    just(Token::Gt).to(BinaryOp::Gt),
                ))
                .then(additive)
                .repeated(),
                |a, (op, b)| binary(op, a, b),
            )
            .labelled("comparison");

        let equality = relational
            .clone()
            .foldl(
                choice((
                    just(Token::StrictEq).to(BinaryOp::StrictEq),
                    just(Token::StrictNe).to(BinaryOp::StrictNe),
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::Ne),
                ))
                .then(relational)
                .repeated(),
                |a, (op, b)| binary(op, a, b),
            )
            .labelled("equality")
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::AndAnd).ignore_then(equality).repeated(),
                |a, b| logical(LogicalOp::And, a, b),
            )
            .labelled("and");

        let or = and
            .clone()
            .foldl(
                just(Token::OrOr).ignore_then(and).repeated(),
                |a, b| logical(LogicalOp::Or, a, b),
            )
            .labelled("or");

        let nullish = or
            .clone()
            .foldl(
                just(Token::Nullish).ignore_then(or).repeated(),
                |a, b| logical(LogicalOp::Nullish, a, b),
            )
            .labelled("nullish")
            .boxed();

        nullish
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(condition, branches)| match branches {
                Some((then_branch, else_branch)) => Expr::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                None => condition,
            })
            .labelled("expression")
    })
}

// ---------------- Public API ----------------

/// Parse normalized expression source into an [`Expr`].
///
/// Returns `Err(Vec<String>)` with human-readable diagnostics on failure.
///
/// ```
/// use surfcore::expr::{ast::{BinaryOp, Expr}, parser::parse};
/// let e = parse("prop('dev:x') + 1").unwrap();
/// assert!(matches!(e, Expr::Binary(BinaryOp::Add, _, _)));
/// assert!(parse("eval('1')").is_err());
/// ```
pub fn parse(src: &str) -> Result<Expr, Vec<String>> {
    let (tokens, lex_errs) = lexer().parse(src).into_output_errors();
    let mut errors: Vec<String> = Vec::new();
    errors.extend(lex_errs.into_iter().map(|e| format!("lexing error: {e}")));

    let tokens = match tokens {
        Some(toks) => toks,
        None => return Err(errors),
    };

    let plain: Vec<Token> = tokens.into_iter().map(|(t, _s)| t).collect();
    let (expr, parse_errs) = expr_parser()
        .then_ignore(end())
        .parse(plain.as_slice())
        .into_output_errors();
    errors.extend(parse_errs.into_iter().map(|e| format!("parse error: {e}")));
    if !errors.is_empty() {
        return Err(errors);
    }

    expr.ok_or(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: impl Into<Value>) -> Box<Expr> {
        Box::new(Expr::Literal(v.into()))
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                lit(1),
                Box::new(Expr::Binary(BinaryOp::Mul, lit(2), lit(3)))
            )
        );
        assert_eq!(
            parse("2 ** 3 ** 2").unwrap(),
            Expr::Binary(
                BinaryOp::Pow,
                lit(2),
                Box::new(Expr::Binary(BinaryOp::Pow, lit(3), lit(2)))
            )
        );
        assert_eq!(
            parse("-(1.5)").unwrap(),
            Expr::Unary(UnaryOp::Neg, lit(1.5))
        );
    }

    #[test]
    fn conditional_and_nullish() {
        let expr = parse("url('query.a') ?? 1 ? 'yes' : \"no\"").unwrap();
        let Expr::Conditional { condition, then_branch, else_branch } = expr else {
            panic!("expected a conditional");
        };
        assert!(matches!(*condition, Expr::Logical(LogicalOp::Nullish, _, _)));
        assert_eq!(then_branch, lit("yes"));
        assert_eq!(else_branch, lit("no"));
    }

    #[test]
    fn resolver_calls_and_math() {
        assert_eq!(
            parse("prop('dev:x')").unwrap(),
            Expr::Call(Callee::Prop, vec![Expr::Literal(Value::from("dev:x"))])
        );
        assert_eq!(parse("prop()").unwrap(), Expr::Call(Callee::Prop, vec![]));
        assert_eq!(
            parse("math.max(1, 2,)").unwrap(),
            Expr::Call(Callee::Math(MathFn::Max), vec![*lit(1), *lit(2)])
        );
        assert_eq!(parse("Math.PI").unwrap(), Expr::MathConst(MathConst::Pi));
        assert!(matches!(
            parse("osc('/a')[1]").unwrap(),
            Expr::Index(_, _)
        ));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse(r#"'it\'s' + "a\"b\n""#).unwrap(),
            Expr::Binary(BinaryOp::Add, lit("it's"), lit("a\"b\n"))
        );
    }

    #[test]
    fn forbidden_constructs_do_not_parse() {
        for src in [
            "eval('1+1')",
            "Function('return 1')()",
            "function () { return 1 }",
            "x => x",
            "() => 1",
            "new Date()",
            "this.constructor",
            "globalThis",
            "window.location",
            "require('fs')",
            "import('x')",
            "({}).__proto__",
            "prop('a:b').constructor",
            "a = 1",
            "1; 2",
        ] {
            assert!(parse(src).is_err(), "`{src}` should be rejected");
        }
    }

    #[test]
    fn arity_and_unknown_names_are_reported() {
        let errs = parse("math.sqrt(1, 2)").unwrap_err();
        assert!(errs.iter().all(|e| e.starts_with("parse error")), "{errs:?}");
        assert!(parse("math.nope(1)").is_err());
        assert!(parse("math.TAU").is_err());
        assert!(parse("prop('a', 1, 2)").is_err());
        assert!(parse("osc()").is_err());
        assert!(parse("").is_err());
    }
}
