//! Recursive-descent parser for DBN token streams
//!
//! The grammar is LL(1): every construct is decided by the front token.
//! Statements own their terminating NEWLINE and must consume it. Blocks are
//! `{ ... }` with any number of leading newlines before the opening brace.
//!
//! Parenthesized arithmetic is collected as a flat alternating list of
//! operands and operator tokens, then folded by precedence passes: all `*`
//! and `/` first, then all `+` and `-`, each pass scanning left to right.

pub mod ast;

use std::collections::VecDeque;

pub use ast::{BinaryOp, Node, NodeKind, QuestionOp};

use crate::errors::{ParseError, ParseErrorKind};
use crate::tokenizer::{Token, TokenKind};

/// Parses a token stream into a program node
pub fn parse(tokens: Vec<Token>) -> Result<Node, ParseError> {
    let mut stream = TokenStream::new(tokens);
    parse_program(&mut stream)
}

/// The parser's view of the token sequence: peek one, pop from the front
struct TokenStream {
    tokens: VecDeque<Token>,
    last_line: usize,
    last_col: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
            last_line: 1,
            last_col: 1,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    fn pop(&mut self) -> Option<Token> {
        let token = self.tokens.pop_front();
        if let Some(t) = &token {
            self.last_line = t.line;
            self.last_col = t.col;
        }
        token
    }

    /// Builds an error at the front token, or at the last consumed position
    /// when the stream has run dry
    fn error(&self, kind: ParseErrorKind, detail: impl Into<String>) -> ParseError {
        let (line, col) = match self.peek() {
            Some(t) => (t.line, t.col),
            None => (self.last_line, self.last_col),
        };
        ParseError::new(kind, line, col, detail)
    }
}

fn parse_program(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let mut children = Vec::new();

    while let Some(first) = stream.peek() {
        let node = if first.kind == TokenKind::Command {
            parse_define_command(stream)?
        } else {
            parse_block_statement(stream)?
        };
        children.push(node);
    }

    let tokens = span_of(&children);
    Ok(Node::new(NodeKind::Block(children), 1, tokens))
}

/// One statement: Set, Repeat, a question, a command invocation, Load, or a
/// bare newline (a no-op)
fn parse_block_statement(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let first = stream
        .peek()
        .ok_or_else(|| stream.error(ParseErrorKind::UnexpectedEnd, "expected a statement"))?;

    match first.kind {
        TokenKind::Set => parse_set(stream),
        TokenKind::Repeat => parse_repeat(stream),
        TokenKind::Question => parse_question(stream),
        TokenKind::Word => parse_command(stream),
        TokenKind::Load => parse_load(stream),
        TokenKind::Newline => {
            let newline = stream.pop().expect("peeked newline");
            let line = newline.line;
            Ok(Node::new(NodeKind::NoOp, line, vec![newline]))
        }
        other => Err(stream.error(
            ParseErrorKind::UnexpectedToken,
            format!("cannot start a statement with {other}"),
        )),
    }
}

fn parse_set(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let set_token = stream.pop().expect("peeked Set");

    let target = parse_arg(stream)?;
    if !target.is_set_target() {
        return Err(ParseError::new(
            ParseErrorKind::BadSetTarget,
            set_token.line,
            set_token.col,
            "the first argument to Set must be a word or a dot",
        ));
    }

    let value = parse_arg(stream)?;
    let newline = terminating_newline(stream)?;

    let mut tokens = vec![set_token.clone()];
    tokens.extend(target.tokens.iter().cloned());
    tokens.extend(value.tokens.iter().cloned());
    tokens.push(newline);

    Ok(Node::new(
        NodeKind::Set {
            target: Box::new(target),
            value: Box::new(value),
        },
        set_token.line,
        tokens,
    ))
}

fn parse_repeat(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let repeat_token = stream.pop().expect("peeked Repeat");

    let var_token = match stream.peek() {
        Some(t) if t.kind == TokenKind::Word => stream.pop().expect("peeked word"),
        _ => {
            return Err(stream.error(
                ParseErrorKind::UnexpectedToken,
                "the Repeat variable must be a word",
            ))
        }
    };

    let start = parse_arg(stream)?;
    let end = parse_arg(stream)?;
    let body = parse_block(stream)?;
    let newline = terminating_newline(stream)?;

    let mut tokens = vec![repeat_token.clone(), var_token.clone()];
    tokens.extend(start.tokens.iter().cloned());
    tokens.extend(end.tokens.iter().cloned());
    tokens.extend(body.tokens.iter().cloned());
    tokens.push(newline);

    Ok(Node::new(
        NodeKind::Repeat {
            var: var_token.value,
            start: Box::new(start),
            end: Box::new(end),
            body: Box::new(body),
        },
        repeat_token.line,
        tokens,
    ))
}

fn parse_question(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let question_token = stream.pop().expect("peeked question");
    let op = QuestionOp::from_name(&question_token.value).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::UnexpectedToken,
            question_token.line,
            question_token.col,
            format!("unknown question '{}?'", question_token.value),
        )
    })?;

    let left = parse_arg(stream)?;
    let right = parse_arg(stream)?;
    let body = parse_block(stream)?;
    let newline = terminating_newline(stream)?;

    let mut tokens = vec![question_token.clone()];
    tokens.extend(left.tokens.iter().cloned());
    tokens.extend(right.tokens.iter().cloned());
    tokens.extend(body.tokens.iter().cloned());
    tokens.push(newline);

    Ok(Node::new(
        NodeKind::Question {
            op,
            left: Box::new(left),
            right: Box::new(right),
            body: Box::new(body),
        },
        question_token.line,
        tokens,
    ))
}

fn parse_command(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let name_token = stream.pop().expect("peeked word");

    let mut args = Vec::new();
    let newline = loop {
        match stream.peek() {
            None => {
                return Err(stream.error(
                    ParseErrorKind::UnterminatedCommand,
                    format!("'{}' invocation never ends", name_token.value),
                ))
            }
            Some(t) if t.kind == TokenKind::Newline => {
                break stream.pop().expect("peeked newline");
            }
            Some(_) => args.push(parse_arg(stream)?),
        }
    };

    let mut tokens = vec![name_token.clone()];
    for arg in &args {
        tokens.extend(arg.tokens.iter().cloned());
    }
    tokens.push(newline);

    Ok(Node::new(
        NodeKind::Command {
            name: name_token.value,
            args,
        },
        name_token.line,
        tokens,
    ))
}

fn parse_load(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let load_token = stream.pop().expect("peeked Load");

    let path_token = match stream.peek() {
        Some(t) if t.kind == TokenKind::Path => stream.pop().expect("peeked path"),
        _ => {
            return Err(stream.error(
                ParseErrorKind::UnexpectedToken,
                "expected a path after Load",
            ))
        }
    };
    let newline = terminating_newline(stream)?;

    let tokens = vec![load_token.clone(), path_token.clone(), newline];
    Ok(Node::new(
        NodeKind::Load(path_token.value),
        load_token.line,
        tokens,
    ))
}

/// `Command <name> <formal>... { ... }`
///
/// The arguments must all be words, so this bypasses the normal argument
/// route. The block's leading newlines are left for `parse_block`.
fn parse_define_command(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let command_token = stream.pop().expect("peeked Command");

    let mut words = Vec::new();
    loop {
        match stream.peek() {
            None => {
                return Err(stream.error(
                    ParseErrorKind::UnexpectedEnd,
                    "Command definition never reaches its body",
                ))
            }
            Some(t) if t.kind == TokenKind::OpenBrace || t.kind == TokenKind::Newline => break,
            Some(t) if t.kind == TokenKind::Word => {
                words.push(stream.pop().expect("peeked word"));
            }
            Some(t) => {
                return Err(ParseError::new(
                    ParseErrorKind::BadCommandDefinitionArg,
                    t.line,
                    t.col,
                    format!("every argument to Command must be a word, got {}", t.kind),
                ))
            }
        }
    }

    // we must have at least one: the name of the command
    if words.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::BadCommandDefinitionArg,
            command_token.line,
            command_token.col,
            "Command needs at least a name",
        ));
    }

    let body = parse_block(stream)?;

    let mut tokens = vec![command_token.clone()];
    tokens.extend(words.iter().cloned());
    tokens.extend(body.tokens.iter().cloned());

    let name = words[0].value.clone();
    let formals = words[1..].iter().map(|w| w.value.clone()).collect();

    Ok(Node::new(
        NodeKind::CommandDefinition {
            name,
            formals,
            body: Box::new(body),
        },
        command_token.line,
        tokens,
    ))
}

fn parse_block(stream: &mut TokenStream) -> Result<Node, ParseError> {
    // any number of newlines may precede the opening brace
    let mut leading = Vec::new();
    while matches!(stream.peek(), Some(t) if t.kind == TokenKind::Newline) {
        leading.push(stream.pop().expect("peeked newline"));
    }

    let open_token = match stream.peek() {
        Some(t) if t.kind == TokenKind::OpenBrace => stream.pop().expect("peeked brace"),
        Some(t) => {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                t.line,
                t.col,
                format!("expected '{{' to open a block, got {}", t.kind),
            ))
        }
        None => {
            return Err(stream.error(
                ParseErrorKind::UnterminatedBlock,
                "expected '{' but the input ended",
            ))
        }
    };

    let mut children = Vec::new();
    let close_token = loop {
        match stream.peek() {
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::UnterminatedBlock,
                    open_token.line,
                    open_token.col,
                    "this block is never closed",
                ))
            }
            Some(t) if t.kind == TokenKind::CloseBrace => {
                break stream.pop().expect("peeked brace");
            }
            Some(_) => children.push(parse_block_statement(stream)?),
        }
    };

    let mut tokens = leading;
    tokens.push(open_token.clone());
    tokens.extend(span_of(&children));
    tokens.push(close_token);

    Ok(Node::new(NodeKind::Block(children), open_token.line, tokens))
}

/// An argument: a number, a word, parenthesized arithmetic, or a dot
fn parse_arg(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let first = stream
        .peek()
        .ok_or_else(|| stream.error(ParseErrorKind::UnexpectedEnd, "expected an argument"))?;

    match first.kind {
        TokenKind::Number => parse_number(stream),
        TokenKind::Word => parse_word(stream),
        TokenKind::OpenParen => parse_arithmetic(stream),
        TokenKind::OpenBracket => parse_bracket(stream),
        other => Err(stream.error(
            ParseErrorKind::UnexpectedToken,
            format!("cannot parse {other} as an argument"),
        )),
    }
}

/// Elements of the flat list collected inside parentheses
enum Element {
    Operand(Node),
    Operator(Token),
}

/// The precedence passes, highest first; every pass folds left to right
const PRECEDENCE: [&[&str]; 2] = [&["*", "/"], &["+", "-"]];

fn parse_arithmetic(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let open_token = stream.pop().expect("peeked paren");

    // collect the flat operand/operator list
    let mut elements = Vec::new();
    let close_token = loop {
        match stream.peek() {
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedEnd,
                    open_token.line,
                    open_token.col,
                    "this parenthesis is never closed",
                ))
            }
            Some(t) if t.kind == TokenKind::CloseParen => {
                break stream.pop().expect("peeked paren");
            }
            Some(t) if t.kind == TokenKind::Operator => {
                elements.push(Element::Operator(stream.pop().expect("peeked operator")));
            }
            Some(_) => elements.push(Element::Operand(parse_arg(stream)?)),
        }
    };

    // fold by precedence until a single operation remains
    while elements.len() > 1 {
        let index = find_foldable_operator(&elements).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::BadArithmetic,
                open_token.line,
                open_token.col,
                "operands without an operator between them",
            )
        })?;
        fold_at(&mut elements, index)?;
    }

    let node = match elements.pop() {
        Some(Element::Operand(node)) => node,
        Some(Element::Operator(t)) => {
            return Err(ParseError::new(
                ParseErrorKind::BadArithmetic,
                t.line,
                t.col,
                format!("'{}' is not an expression", t.value),
            ))
        }
        None => {
            return Err(ParseError::new(
                ParseErrorKind::BadArithmetic,
                open_token.line,
                open_token.col,
                "empty parentheses",
            ))
        }
    };

    // the folded node inherits the parenthesis tokens as its span
    let mut tokens = vec![open_token.clone()];
    tokens.extend(node.tokens.iter().cloned());
    tokens.push(close_token);

    Ok(Node::new(node.kind, open_token.line, tokens))
}

/// Finds the leftmost operator of the highest precedence group present
fn find_foldable_operator(elements: &[Element]) -> Option<usize> {
    for group in PRECEDENCE {
        for (index, element) in elements.iter().enumerate() {
            if let Element::Operator(t) = element {
                if group.contains(&t.value.as_str()) {
                    return Some(index);
                }
            }
        }
    }
    None
}

/// Replaces `[left, op, right]` around `index` with a single operation node
fn fold_at(elements: &mut Vec<Element>, index: usize) -> Result<(), ParseError> {
    let op_token = match &elements[index] {
        Element::Operator(t) => t.clone(),
        Element::Operand(_) => unreachable!("find_foldable_operator returns operator indices"),
    };
    let complain = |side: &str| {
        ParseError::new(
            ParseErrorKind::BadArithmetic,
            op_token.line,
            op_token.col,
            format!("nothing to the {side} of '{}'", op_token.value),
        )
    };

    if index == 0 {
        return Err(complain("left"));
    }
    if index + 1 >= elements.len() {
        return Err(complain("right"));
    }

    let mut window = elements.splice(index - 1..=index + 1, std::iter::empty());
    let left = match window.next() {
        Some(Element::Operand(node)) => node,
        _ => return Err(complain("left")),
    };
    let _op = window.next();
    let right = match window.next() {
        Some(Element::Operand(node)) => node,
        _ => return Err(complain("right")),
    };
    drop(window);

    let op = BinaryOp::from_symbol(&op_token.value).expect("operator token is one of + - * /");

    let mut tokens = left.tokens.clone();
    tokens.push(op_token.clone());
    tokens.extend(right.tokens.iter().cloned());

    let folded = Node::new(
        NodeKind::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        op_token.line,
        tokens,
    );
    elements.insert(index - 1, Element::Operand(folded));
    Ok(())
}

fn parse_bracket(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let open_token = stream.pop().expect("peeked bracket");

    let x = parse_arg(stream)?;
    let y = parse_arg(stream)?;

    let close_token = match stream.peek() {
        Some(t) if t.kind == TokenKind::CloseBracket => stream.pop().expect("peeked bracket"),
        _ => {
            return Err(stream.error(
                ParseErrorKind::BadBracketArity,
                "a dot holds exactly two arguments",
            ))
        }
    };

    let mut tokens = vec![open_token.clone()];
    tokens.extend(x.tokens.iter().cloned());
    tokens.extend(y.tokens.iter().cloned());
    tokens.push(close_token);

    Ok(Node::new(
        NodeKind::Bracket {
            x: Box::new(x),
            y: Box::new(y),
        },
        open_token.line,
        tokens,
    ))
}

fn parse_word(stream: &mut TokenStream) -> Result<Node, ParseError> {
    match stream.peek() {
        Some(t) if t.kind == TokenKind::Word => {
            let token = stream.pop().expect("peeked word");
            Ok(Node::new(
                NodeKind::Word(token.value.clone()),
                token.line,
                vec![token],
            ))
        }
        _ => Err(stream.error(ParseErrorKind::UnexpectedToken, "expected a word")),
    }
}

fn parse_number(stream: &mut TokenStream) -> Result<Node, ParseError> {
    let token = stream.pop().expect("peeked number");
    let value: i64 = token.value.parse().map_err(|_| {
        ParseError::new(
            ParseErrorKind::UnexpectedToken,
            token.line,
            token.col,
            "number literal out of range",
        )
    })?;
    Ok(Node::new(NodeKind::Number(value), token.line, vec![token]))
}

/// A statement must end with a newline, and the statement consumes it
fn terminating_newline(stream: &mut TokenStream) -> Result<Token, ParseError> {
    match stream.peek() {
        Some(t) if t.kind == TokenKind::Newline => Ok(stream.pop().expect("peeked newline")),
        _ => Err(stream.error(
            ParseErrorKind::MissingNewline,
            "statements end with a newline",
        )),
    }
}

fn span_of(nodes: &[Node]) -> Vec<Token> {
    let mut tokens = Vec::new();
    for node in nodes {
        tokens.extend(node.tokens.iter().cloned());
    }
    tokens
}
