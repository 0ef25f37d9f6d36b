//! Syntax layer: tokens, the arena tree and a reference parser.
//!
//! The semantic model only relies on [`SyntaxTree`]'s navigation API, so any
//! front end that can populate a tree through [`TreeBuilder`] can feed it.
//! [`parse`] is the bundled front end used by the host layer and tests.

pub mod lexer;
mod parser;
mod tree;

pub use parser::parse;
pub use tree::{Checkpoint, NodeId, NodeRef, Rule, SyntaxTree, Token, TokenKind, TreeBuilder};
