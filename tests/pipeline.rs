//! Tokenizer and parser working together over whole programs

use dbn::errors::ParseErrorKind;
use dbn::parser::{self, NodeKind};
use dbn::tokenizer::{self, TokenKind};

fn parse(source: &str) -> dbn::parser::Node {
    parser::parse(tokenizer::tokenize(source).unwrap()).unwrap()
}

fn top_level(node: &dbn::parser::Node) -> &[dbn::parser::Node] {
    match &node.kind {
        NodeKind::Block(children) => children,
        other => panic!("expected a program block, got {other:?}"),
    }
}

#[test]
fn a_full_sketch_parses() {
    let source = "\
// a box at each step of the diagonal
Command Box x y
{
  Line x y (x + 10) y
  Line (x + 10) y (x + 10) (y + 10)
  Line (x + 10) (y + 10) x (y + 10)
  Line x (y + 10) x y
}

Paper 0
Pen 100
Repeat A 0 8
{
  Smaller? A 8
  {
    Box (A * 10) (A * 10)
  }
}
";
    let program = parse(source);
    let statements: Vec<_> = top_level(&program)
        .iter()
        .filter(|n| !matches!(n.kind, NodeKind::NoOp))
        .collect();

    assert_eq!(statements.len(), 4);
    assert!(matches!(
        statements[0].kind,
        NodeKind::CommandDefinition { .. }
    ));
    assert!(matches!(statements[1].kind, NodeKind::Command { .. }));
    assert!(matches!(statements[2].kind, NodeKind::Command { .. }));
    assert!(matches!(statements[3].kind, NodeKind::Repeat { .. }));
}

#[test]
fn statement_nodes_carry_their_source_lines() {
    let source = "Paper 0\n\nPen 100\nLine 0 0 100 100\n";
    let program = parse(source);
    let lines: Vec<_> = top_level(&program)
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Command { .. }))
        .map(|n| n.line_no)
        .collect();
    assert_eq!(lines, vec![1, 3, 4]);
}

#[test]
fn node_spans_reconstruct_the_source_without_blanks() {
    let source = "Set A (2 + 3)\nPaper A // comment\n";
    let program = parse(source);
    let raw: String = program.tokens.iter().map(|t| t.raw.as_str()).collect();
    assert_eq!(raw, "SetA(2+3)\nPaperA\n\n");
}

#[test]
fn keywords_win_over_words_by_rule_order() {
    let tokens = tokenizer::tokenize("Repeated 1\n").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Repeat);
    assert_eq!(tokens[1].kind, TokenKind::Word);
    assert_eq!(tokens[1].value, "ed");
}

#[test]
fn parse_error_positions_point_at_the_offender() {
    let err = parser::parse(tokenizer::tokenize("Paper 0\nSet A }\n").unwrap()).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    assert_eq!(err.line, 2);
    assert_eq!(err.col, 7);
}

#[test]
fn lex_error_positions_point_at_the_character() {
    let err = tokenizer::tokenize("Paper 0\nPen @\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.col, 5);
}

#[test]
fn oversized_number_literals_are_rejected() {
    let err = parser::parse(tokenizer::tokenize("Set A 99999999999999999999\n").unwrap());
    assert!(err.is_err());
}

#[test]
fn question_requires_a_block() {
    let err = parser::parse(tokenizer::tokenize("Same? A 5 Paper 0\n").unwrap()).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
}

#[test]
fn nested_arithmetic_and_dots_parse() {
    let program = parse("Set A ([10 20] + (B * 2))\n");
    match &top_level(&program)[0].kind {
        NodeKind::Set { value, .. } => match &value.kind {
            NodeKind::BinaryOp { left, right, .. } => {
                assert!(matches!(left.kind, NodeKind::Bracket { .. }));
                assert!(matches!(right.kind, NodeKind::BinaryOp { .. }));
            }
            other => panic!("expected an operation, got {other:?}"),
        },
        other => panic!("expected Set, got {other:?}"),
    }
}
