//! Recursive-descent parser producing a [`SyntaxTree`].
//!
//! The grammar is the C#-shaped subset the resolver understands. The parser
//! never fails: unexpected tokens are wrapped in `Rule::Error` nodes and
//! skipped, missing tokens are simply absent from the tree.

use smol_str::SmolStr;

use super::lexer::{is_predefined_type, tokenize};
use super::tree::{Checkpoint, Rule, SyntaxTree, Token, TokenKind, TreeBuilder};

/// Parses a whole compilation unit.
pub fn parse(text: &str) -> SyntaxTree {
    let mut parser = Parser::new(tokenize(text));
    parser.compilation_unit();
    parser.builder.finish()
}

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "abstract", "sealed", "virtual",
    "override", "readonly", "const", "new", "extern", "unsafe", "volatile",
];

const PARAMETER_MODIFIERS: &[&str] = &["ref", "out", "params", "this"];

const ASSIGNMENT_OPS: &[&str] = &["=", "+=", "-=", "*=", "/="];

/// Tokens that may follow a type argument list inside an expression.
const TYPE_ARGUMENT_FOLLOW: &[&str] = &[
    "(", ")", "]", "}", ":", ";", ",", ".", "?", "==", "!=",
];

fn binary_precedence(text: &str) -> Option<u8> {
    Some(match text {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" => 7,
        "<" | ">" | "<=" | ">=" | "is" | "as" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builder: TreeBuilder,
    /// Names of the enclosing type declarations, innermost last.
    type_names: Vec<SmolStr>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            builder: TreeBuilder::new(),
            type_names: Vec::new(),
        }
    }

    // ========================================================================
    // TOKEN CURSOR
    // ========================================================================

    fn nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn tok(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn at(&self, text: &str) -> bool {
        self.nth(0).is_some_and(|t| t.kind != TokenKind::StringLiteral && t.is(text))
    }

    fn nth_is(&self, n: usize, text: &str) -> bool {
        self.nth(n).is_some_and(|t| t.kind != TokenKind::StringLiteral && t.is(text))
    }

    fn tok_is(&self, index: usize, text: &str) -> bool {
        self.tok(index).is_some_and(|t| t.kind != TokenKind::StringLiteral && t.is(text))
    }

    fn at_ident(&self) -> bool {
        self.nth_ident(0)
    }

    fn nth_ident(&self, n: usize) -> bool {
        self.nth(n).is_some_and(|t| t.kind == TokenKind::Identifier)
    }

    fn tok_ident(&self, index: usize) -> bool {
        self.tok(index).is_some_and(|t| t.kind == TokenKind::Identifier)
    }

    fn at_any(&self, set: &[&str]) -> bool {
        set.iter().any(|s| self.at(s))
    }

    fn bump(&mut self) {
        if let Some(token) = self.tokens.get(self.pos).cloned() {
            self.builder.token(token);
            self.pos += 1;
        }
    }

    fn expect(&mut self, text: &str) {
        if self.at(text) {
            self.bump();
        }
    }

    fn expect_ident(&mut self) {
        if self.at_ident() {
            self.bump();
        }
    }

    fn error_token(&mut self) {
        self.builder.start_node(Rule::Error);
        self.bump();
        self.builder.finish_node();
    }

    /// Wraps everything since `cp` plus at least one more token in an error node.
    fn error_since(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::Error);
        if !self.at("}") {
            self.bump();
        }
        self.builder.finish_node();
    }

    // ========================================================================
    // LOOKAHEAD SCANS (no tree output)
    // ========================================================================

    /// End index of a syntactic type starting at `pos`.
    fn scan_type(&self, pos: usize) -> Option<usize> {
        let first = self.tok(pos)?;
        let mut p = pos + 1;
        if first.kind == TokenKind::Keyword {
            if !is_predefined_type(&first.text) {
                return None;
            }
        } else if first.kind == TokenKind::Identifier {
            if self.tok_is(p, "<") {
                p = self.scan_type_arguments(p)?;
            }
            while self.tok_is(p, ".") && self.tok_ident(p + 1) {
                p += 2;
                if self.tok_is(p, "<") {
                    p = self.scan_type_arguments(p)?;
                }
            }
        } else {
            return None;
        }
        if self.tok_is(p, "?") {
            p += 1;
        }
        while self.tok_is(p, "[") && (self.tok_is(p + 1, "]") || self.tok_is(p + 1, ",")) {
            p += 1;
            while self.tok_is(p, ",") {
                p += 1;
            }
            if !self.tok_is(p, "]") {
                return None;
            }
            p += 1;
        }
        Some(p)
    }

    fn scan_type_arguments(&self, pos: usize) -> Option<usize> {
        let mut p = pos + 1;
        loop {
            p = self.scan_type(p)?;
            if self.tok_is(p, ",") {
                p += 1;
            } else if self.tok_is(p, ">") {
                return Some(p + 1);
            } else {
                return None;
            }
        }
    }

    fn generic_arguments_follow(&self) -> bool {
        match self.scan_type_arguments(self.pos) {
            Some(end) => {
                end >= self.tokens.len() || TYPE_ARGUMENT_FOLLOW.iter().any(|t| self.tok_is(end, t))
            }
            None => false,
        }
    }

    fn is_local_declaration(&self) -> bool {
        let start = if self.at("const") { self.pos + 1 } else { self.pos };
        self.scan_type(start).is_some_and(|end| {
            self.tok_ident(end)
                && (self.tok_is(end + 1, "=") || self.tok_is(end + 1, ";") || self.tok_is(end + 1, ","))
        })
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for i in open..self.tokens.len() {
            if self.tok_is(i, "(") {
                depth += 1;
            } else if self.tok_is(i, ")") {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    fn is_lambda_start(&self) -> bool {
        if self.at_ident() && self.nth_is(1, "=>") {
            return true;
        }
        self.at("(")
            && self
                .matching_paren(self.pos)
                .is_some_and(|close| self.tok_is(close + 1, "=>"))
    }

    fn is_query_start(&self) -> bool {
        if !(self.at_ident() && self.at("from")) {
            return false;
        }
        if self.nth_ident(1) && self.nth_is(2, "in") {
            return true;
        }
        self.scan_type(self.pos + 1)
            .is_some_and(|end| self.tok_ident(end) && self.tok_is(end + 1, "in"))
    }

    fn is_cast(&self) -> bool {
        if !self.at("(") {
            return false;
        }
        let Some(end) = self.scan_type(self.pos + 1) else {
            return false;
        };
        if !self.tok_is(end, ")") {
            return false;
        }
        if self.nth(1).is_some_and(|t| t.kind == TokenKind::Keyword) {
            return true;
        }
        match self.tok(end + 1) {
            Some(next) => match next.kind {
                TokenKind::Identifier
                | TokenKind::IntegerLiteral
                | TokenKind::RealLiteral
                | TokenKind::StringLiteral
                | TokenKind::CharLiteral => true,
                TokenKind::Keyword => matches!(
                    next.text.as_str(),
                    "this" | "base" | "new" | "typeof" | "default" | "true" | "false" | "null"
                ),
                TokenKind::Punct => next.is("!") || next.is("~"),
                TokenKind::Error => false,
            },
            None => false,
        }
    }

    fn at_modifier(&self) -> bool {
        if self.at_any(MODIFIERS) {
            return true;
        }
        self.at_ident()
            && self.at("partial")
            && (self.nth_is(1, "class")
                || self.nth_is(1, "struct")
                || self.nth_is(1, "interface")
                || self.nth_is(1, "void"))
    }

    // ========================================================================
    // DECLARATIONS
    // ========================================================================

    fn compilation_unit(&mut self) {
        self.builder.start_node(Rule::CompilationUnit);
        while !self.eof() {
            self.namespace_member();
        }
        self.builder.finish_node();
    }

    fn namespace_member(&mut self) {
        if self.at("using") {
            self.using_directive();
        } else if self.at("namespace") {
            self.namespace_declaration();
        } else {
            let cp = self.builder.checkpoint();
            let start = self.pos;
            self.attributes();
            self.modifiers();
            if !self.type_declaration(cp) {
                if self.pos == start {
                    self.error_token();
                } else {
                    self.error_since(cp);
                }
            }
        }
    }

    fn using_directive(&mut self) {
        if self.nth_ident(1) && self.nth_is(2, "=") {
            self.builder.start_node(Rule::UsingAlias);
            self.bump();
            self.bump();
            self.bump();
            self.type_reference();
        } else {
            self.builder.start_node(Rule::UsingDirective);
            self.bump();
            self.qualified_name();
        }
        self.expect(";");
        self.builder.finish_node();
    }

    fn qualified_name(&mut self) {
        self.builder.start_node(Rule::QualifiedName);
        self.expect_ident();
        while self.at(".") && self.nth_ident(1) {
            self.bump();
            self.bump();
        }
        self.builder.finish_node();
    }

    fn namespace_declaration(&mut self) {
        self.builder.start_node(Rule::NamespaceDeclaration);
        self.bump();
        self.qualified_name();
        self.builder.start_node(Rule::NamespaceBody);
        self.expect("{");
        while !self.eof() && !self.at("}") {
            self.namespace_member();
        }
        self.expect("}");
        self.builder.finish_node();
        self.builder.finish_node();
    }

    /// Parses a type declaration whose attributes and modifiers were
    /// already emitted after `cp`. Returns `false` if no type keyword follows.
    fn type_declaration(&mut self, cp: Checkpoint) -> bool {
        if self.at("class") {
            self.class_like(cp, Rule::ClassDeclaration);
        } else if self.at("struct") {
            self.class_like(cp, Rule::StructDeclaration);
        } else if self.at("interface") {
            self.class_like(cp, Rule::InterfaceDeclaration);
        } else if self.at("enum") {
            self.enum_declaration(cp);
        } else if self.at("delegate") {
            self.delegate_declaration(cp);
        } else {
            return false;
        }
        true
    }

    fn attributes(&mut self) {
        while self.at("[") {
            self.builder.start_node(Rule::AttributeSection);
            self.bump();
            if self.nth(0).is_some_and(|t| t.kind != TokenKind::Punct) && self.nth_is(1, ":") {
                self.bump();
                self.bump();
            }
            loop {
                self.builder.start_node(Rule::Attribute);
                self.type_reference();
                if self.at("(") {
                    self.argument_list("(", ")");
                }
                self.builder.finish_node();
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect("]");
            self.builder.finish_node();
        }
    }

    fn modifiers(&mut self) {
        if !self.at_modifier() {
            return;
        }
        self.builder.start_node(Rule::Modifiers);
        while self.at_modifier() {
            self.bump();
        }
        self.builder.finish_node();
    }

    fn class_like(&mut self, cp: Checkpoint, rule: Rule) {
        self.builder.start_node_at(cp, rule);
        self.bump();
        let name = self
            .nth(0)
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.clone())
            .unwrap_or_default();
        self.expect_ident();
        if self.at("<") {
            self.type_parameter_list();
        }
        if self.at(":") {
            self.base_list();
        }
        self.constraint_clauses();
        self.type_names.push(name);
        self.builder.start_node(Rule::ClassBody);
        self.expect("{");
        while !self.eof() && !self.at("}") {
            self.member_declaration();
        }
        self.expect("}");
        self.builder.finish_node();
        self.type_names.pop();
        if self.at(";") {
            self.bump();
        }
        self.builder.finish_node();
    }

    fn type_parameter_list(&mut self) {
        self.builder.start_node(Rule::TypeParameterList);
        self.bump();
        loop {
            self.attributes();
            self.builder.start_node(Rule::TypeParameter);
            self.expect_ident();
            self.builder.finish_node();
            if self.at(",") {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(">");
        self.builder.finish_node();
    }

    fn base_list(&mut self) {
        self.builder.start_node(Rule::BaseList);
        self.bump();
        self.type_reference();
        while self.at(",") {
            self.bump();
            self.type_reference();
        }
        self.builder.finish_node();
    }

    /// `where T : ...` clauses are kept as error nodes; constraints do not
    /// take part in resolution.
    fn constraint_clauses(&mut self) {
        while self.at_ident() && self.at("where") {
            self.builder.start_node(Rule::Error);
            while !self.eof() && !self.at("{") && !self.at(";") && !self.at("=>") {
                self.bump();
                if self.at_ident() && self.at("where") {
                    break;
                }
            }
            self.builder.finish_node();
        }
    }

    fn member_declaration(&mut self) {
        let cp = self.builder.checkpoint();
        self.attributes();
        self.modifiers();
        if self.type_declaration(cp) {
            return;
        }
        if self.at("event") {
            self.event_declaration(cp);
            return;
        }
        let is_constructor = self.at_ident()
            && self.nth_is(1, "(")
            && self
                .type_names
                .last()
                .is_some_and(|name| self.nth(0).is_some_and(|t| t.text == *name));
        if is_constructor {
            self.constructor_declaration(cp);
            return;
        }
        let Some(after_type) = self.scan_type(self.pos) else {
            self.error_since(cp);
            return;
        };
        if self.tok_is(after_type, "this") {
            self.indexer_declaration(cp);
        } else if self.tok_ident(after_type) {
            if self.tok_is(after_type + 1, "(") || self.tok_is(after_type + 1, "<") {
                self.method_declaration(cp);
            } else if self.tok_is(after_type + 1, "{") || self.tok_is(after_type + 1, "=>") {
                self.property_declaration(cp);
            } else {
                self.field_declaration(cp);
            }
        } else {
            self.error_since(cp);
        }
    }

    fn field_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::FieldDeclaration);
        self.type_reference();
        self.variable_declarator();
        while self.at(",") {
            self.bump();
            self.variable_declarator();
        }
        self.expect(";");
        self.builder.finish_node();
    }

    fn variable_declarator(&mut self) {
        self.builder.start_node(Rule::VariableDeclarator);
        self.expect_ident();
        if self.at("=") {
            self.bump();
            if self.at("{") {
                self.array_initializer();
            } else {
                self.expression();
            }
        }
        self.builder.finish_node();
    }

    fn property_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::PropertyDeclaration);
        self.type_reference();
        self.expect_ident();
        if self.at("=>") {
            self.bump();
            self.expression();
            self.expect(";");
        } else {
            self.accessor_list();
            if self.at("=") {
                self.bump();
                self.expression();
                self.expect(";");
            }
        }
        self.builder.finish_node();
    }

    fn indexer_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::IndexerDeclaration);
        self.type_reference();
        self.bump();
        self.formal_parameter_list("[", "]");
        self.accessor_list();
        self.builder.finish_node();
    }

    fn event_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::EventDeclaration);
        self.bump();
        self.type_reference();
        self.expect_ident();
        if self.at("{") {
            self.accessor_list();
        } else {
            self.expect(";");
        }
        self.builder.finish_node();
    }

    fn accessor_list(&mut self) {
        self.builder.start_node(Rule::AccessorList);
        self.expect("{");
        while !self.eof() && !self.at("}") {
            let cp = self.builder.checkpoint();
            self.attributes();
            self.modifiers();
            let is_accessor = self.at_ident()
                && (self.at("get") || self.at("set") || self.at("add") || self.at("remove"));
            if is_accessor {
                self.builder.start_node_at(cp, Rule::Accessor);
                self.bump();
                if self.at("{") {
                    self.block();
                } else {
                    self.expect(";");
                }
                self.builder.finish_node();
            } else {
                self.error_since(cp);
            }
        }
        self.expect("}");
        self.builder.finish_node();
    }

    fn method_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::MethodDeclaration);
        self.type_reference();
        self.expect_ident();
        if self.at("<") {
            self.type_parameter_list();
        }
        self.formal_parameter_list("(", ")");
        self.constraint_clauses();
        self.member_body();
        self.builder.finish_node();
    }

    fn constructor_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::ConstructorDeclaration);
        self.bump();
        self.formal_parameter_list("(", ")");
        if self.at(":") && (self.nth_is(1, "base") || self.nth_is(1, "this")) {
            self.builder.start_node(Rule::ConstructorInitializer);
            self.bump();
            self.bump();
            self.argument_list("(", ")");
            self.builder.finish_node();
        }
        self.member_body();
        self.builder.finish_node();
    }

    fn member_body(&mut self) {
        if self.at("{") {
            self.block();
        } else if self.at("=>") {
            self.bump();
            self.expression();
            self.expect(";");
        } else {
            self.expect(";");
        }
    }

    fn enum_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::EnumDeclaration);
        self.bump();
        self.expect_ident();
        if self.at(":") {
            self.base_list();
        }
        self.builder.start_node(Rule::EnumBody);
        self.expect("{");
        while !self.eof() && !self.at("}") {
            self.attributes();
            if self.at_ident() {
                self.builder.start_node(Rule::EnumMember);
                self.bump();
                if self.at("=") {
                    self.bump();
                    self.expression();
                }
                self.builder.finish_node();
                if self.at(",") {
                    self.bump();
                }
            } else if !self.at("}") {
                self.error_token();
            }
        }
        self.expect("}");
        self.builder.finish_node();
        if self.at(";") {
            self.bump();
        }
        self.builder.finish_node();
    }

    fn delegate_declaration(&mut self, cp: Checkpoint) {
        self.builder.start_node_at(cp, Rule::DelegateDeclaration);
        self.bump();
        self.type_reference();
        self.expect_ident();
        if self.at("<") {
            self.type_parameter_list();
        }
        self.formal_parameter_list("(", ")");
        self.constraint_clauses();
        self.expect(";");
        self.builder.finish_node();
    }

    fn formal_parameter_list(&mut self, open: &str, close: &str) {
        self.builder.start_node(Rule::FormalParameterList);
        self.expect(open);
        if !self.at(close) {
            loop {
                self.formal_parameter();
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(close);
        self.builder.finish_node();
    }

    fn formal_parameter(&mut self) {
        self.builder.start_node(Rule::FormalParameter);
        self.attributes();
        if self.at_any(PARAMETER_MODIFIERS) {
            self.builder.start_node(Rule::Modifiers);
            while self.at_any(PARAMETER_MODIFIERS) {
                self.bump();
            }
            self.builder.finish_node();
        }
        self.type_reference();
        self.expect_ident();
        if self.at("=") {
            self.bump();
            self.expression();
        }
        self.builder.finish_node();
    }

    // ========================================================================
    // TYPES
    // ========================================================================

    fn type_reference(&mut self) {
        self.builder.start_node(Rule::TypeReference);
        let predefined = self
            .nth(0)
            .is_some_and(|t| t.kind == TokenKind::Keyword && is_predefined_type(&t.text));
        if predefined {
            self.builder.start_node(Rule::PredefinedType);
            self.bump();
            self.builder.finish_node();
        } else if self.at_ident() {
            self.type_name_segment();
            while self.at(".") && self.nth_ident(1) {
                self.bump();
                self.type_name_segment();
            }
        }
        if self.at("?") && !self.nth(1).is_some_and(|t| t.kind == TokenKind::Identifier && self.nth_is(2, ":")) {
            self.bump();
        }
        while self.at("[") && (self.nth_is(1, "]") || self.nth_is(1, ",")) {
            self.rank_specifier();
        }
        self.builder.finish_node();
    }

    fn type_name_segment(&mut self) {
        self.builder.start_node(Rule::TypeNameSegment);
        self.bump();
        if self.at("<") && self.scan_type_arguments(self.pos).is_some() {
            self.type_argument_list();
        }
        self.builder.finish_node();
    }

    fn type_argument_list(&mut self) {
        self.builder.start_node(Rule::TypeArgumentList);
        self.bump();
        loop {
            self.type_reference();
            if self.at(",") {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(">");
        self.builder.finish_node();
    }

    fn rank_specifier(&mut self) {
        self.builder.start_node(Rule::RankSpecifier);
        self.bump();
        while self.at(",") {
            self.bump();
        }
        self.expect("]");
        self.builder.finish_node();
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn block(&mut self) {
        self.builder.start_node(Rule::Block);
        self.expect("{");
        while !self.eof() && !self.at("}") {
            self.statement();
        }
        self.expect("}");
        self.builder.finish_node();
    }

    fn statement(&mut self) {
        if self.at("{") {
            self.block();
        } else if self.at(";") {
            self.builder.start_node(Rule::EmptyStatement);
            self.bump();
            self.builder.finish_node();
        } else if self.at("return") {
            self.builder.start_node(Rule::ReturnStatement);
            self.bump();
            if !self.at(";") {
                self.expression();
            }
            self.expect(";");
            self.builder.finish_node();
        } else if self.at("if") {
            self.builder.start_node(Rule::IfStatement);
            self.bump();
            self.parenthesized_condition();
            self.statement();
            if self.at("else") {
                self.bump();
                self.statement();
            }
            self.builder.finish_node();
        } else if self.at("while") {
            self.builder.start_node(Rule::WhileStatement);
            self.bump();
            self.parenthesized_condition();
            self.statement();
            self.builder.finish_node();
        } else if self.at("foreach") {
            self.builder.start_node(Rule::ForeachStatement);
            self.bump();
            self.expect("(");
            self.type_reference();
            self.expect_ident();
            self.expect("in");
            self.expression();
            self.expect(")");
            self.statement();
            self.builder.finish_node();
        } else if self.is_local_declaration() {
            self.builder.start_node(Rule::LocalVariableDeclaration);
            if self.at("const") {
                self.builder.start_node(Rule::Modifiers);
                self.bump();
                self.builder.finish_node();
            }
            self.type_reference();
            self.variable_declarator();
            while self.at(",") {
                self.bump();
                self.variable_declarator();
            }
            self.expect(";");
            self.builder.finish_node();
        } else {
            self.builder.start_node(Rule::ExpressionStatement);
            let start = self.pos;
            self.expression();
            if self.pos == start && !self.at(";") && !self.at("}") {
                self.error_token();
            }
            self.expect(";");
            self.builder.finish_node();
        }
    }

    fn parenthesized_condition(&mut self) {
        self.expect("(");
        self.expression();
        self.expect(")");
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    fn expression(&mut self) {
        if self.is_lambda_start() {
            self.lambda();
            return;
        }
        if self.is_query_start() {
            self.query();
            return;
        }
        let cp = self.builder.checkpoint();
        self.conditional();
        if self.at_any(ASSIGNMENT_OPS) {
            self.builder.start_node_at(cp, Rule::AssignmentExpression);
            self.bump();
            self.expression();
            self.builder.finish_node();
        }
    }

    fn conditional(&mut self) {
        let cp = self.builder.checkpoint();
        self.binary(0);
        if self.at("?") {
            self.builder.start_node_at(cp, Rule::ConditionalExpression);
            self.bump();
            self.expression();
            self.expect(":");
            self.expression();
            self.builder.finish_node();
        }
    }

    fn binary(&mut self, min_precedence: u8) {
        let cp = self.builder.checkpoint();
        self.unary();
        loop {
            let Some(op) = self.nth(0).filter(|t| {
                t.kind == TokenKind::Punct || t.kind == TokenKind::Keyword
            }) else {
                break;
            };
            let Some(precedence) = binary_precedence(&op.text) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            if self.at("is") || self.at("as") {
                let rule = if self.at("is") { Rule::IsExpression } else { Rule::AsExpression };
                self.builder.start_node_at(cp, rule);
                self.bump();
                self.type_reference();
                self.builder.finish_node();
                continue;
            }
            self.builder.start_node_at(cp, Rule::BinaryExpression);
            self.bump();
            self.binary(precedence + 1);
            self.builder.finish_node();
        }
    }

    fn unary(&mut self) {
        if self.at_any(&["-", "+", "!", "~", "++", "--"]) {
            self.builder.start_node(Rule::UnaryExpression);
            self.bump();
            self.unary();
            self.builder.finish_node();
        } else if self.is_cast() {
            self.builder.start_node(Rule::CastExpression);
            self.bump();
            self.type_reference();
            self.expect(")");
            self.unary();
            self.builder.finish_node();
        } else {
            self.postfix();
        }
    }

    fn postfix(&mut self) {
        let cp = self.builder.checkpoint();
        if !self.primary() {
            return;
        }
        loop {
            if self.at(".") && self.nth_ident(1) {
                self.builder.start_node_at(cp, Rule::MemberAccess);
                self.bump();
                self.bump();
                if self.at("<") && self.generic_arguments_follow() {
                    self.type_argument_list();
                }
                self.builder.finish_node();
            } else if self.at("(") {
                self.builder.start_node_at(cp, Rule::InvocationExpression);
                self.argument_list("(", ")");
                self.builder.finish_node();
            } else if self.at("[") {
                self.builder.start_node_at(cp, Rule::ElementAccess);
                self.argument_list("[", "]");
                self.builder.finish_node();
            } else if self.at("++") || self.at("--") {
                self.builder.start_node_at(cp, Rule::PostfixExpression);
                self.bump();
                self.builder.finish_node();
            } else {
                break;
            }
        }
    }

    /// Returns `false` when no primary expression starts here.
    fn primary(&mut self) -> bool {
        let Some(token) = self.nth(0).cloned() else {
            return false;
        };
        match token.kind {
            TokenKind::IntegerLiteral
            | TokenKind::RealLiteral
            | TokenKind::StringLiteral
            | TokenKind::CharLiteral => self.literal(),
            TokenKind::Identifier => {
                self.builder.start_node(Rule::SimpleName);
                self.bump();
                if self.at("<") && self.generic_arguments_follow() {
                    self.type_argument_list();
                }
                self.builder.finish_node();
            }
            TokenKind::Keyword => match token.text.as_str() {
                "true" | "false" | "null" => self.literal(),
                "this" => self.single(Rule::ThisAccess),
                "base" => self.single(Rule::BaseAccess),
                "new" => self.creation(),
                "typeof" => self.type_operator(Rule::TypeofExpression),
                "sizeof" => self.type_operator(Rule::SizeofExpression),
                "default" => self.type_operator(Rule::DefaultValueExpression),
                text if is_predefined_type(text) => self.single(Rule::PredefinedType),
                _ => return false,
            },
            TokenKind::Punct if token.is("(") => {
                self.builder.start_node(Rule::ParenthesizedExpression);
                self.bump();
                self.expression();
                self.expect(")");
                self.builder.finish_node();
            }
            _ => return false,
        }
        true
    }

    fn literal(&mut self) {
        self.single(Rule::Literal);
    }

    fn single(&mut self, rule: Rule) {
        self.builder.start_node(rule);
        self.bump();
        self.builder.finish_node();
    }

    fn type_operator(&mut self, rule: Rule) {
        self.builder.start_node(rule);
        self.bump();
        if self.at("(") {
            self.bump();
            self.type_reference();
            self.expect(")");
        }
        self.builder.finish_node();
    }

    fn creation(&mut self) {
        let cp = self.builder.checkpoint();
        self.bump();
        if self.at("[") {
            self.builder.start_node_at(cp, Rule::ArrayCreation);
            self.rank_specifier();
            if self.at("{") {
                self.array_initializer();
            }
            self.builder.finish_node();
            return;
        }
        if self.at("{") {
            self.builder.start_node_at(cp, Rule::ObjectCreation);
            self.object_or_collection_initializer();
            self.builder.finish_node();
            return;
        }
        self.type_reference();
        let has_rank = self.pos > 0 && self.tok_is(self.pos - 1, "]");
        if self.at("[") {
            self.builder.start_node_at(cp, Rule::ArrayCreation);
            self.builder.start_node(Rule::ArraySizes);
            self.bump();
            self.expression();
            while self.at(",") {
                self.bump();
                self.expression();
            }
            self.expect("]");
            self.builder.finish_node();
            while self.at("[") {
                self.rank_specifier();
            }
            if self.at("{") {
                self.array_initializer();
            }
            self.builder.finish_node();
        } else if has_rank {
            self.builder.start_node_at(cp, Rule::ArrayCreation);
            if self.at("{") {
                self.array_initializer();
            }
            self.builder.finish_node();
        } else {
            self.builder.start_node_at(cp, Rule::ObjectCreation);
            if self.at("(") {
                self.argument_list("(", ")");
            }
            if self.at("{") {
                self.object_or_collection_initializer();
            }
            self.builder.finish_node();
        }
    }

    fn object_or_collection_initializer(&mut self) {
        let is_object = self.nth_is(1, "}") || (self.nth_ident(1) && self.nth_is(2, "="));
        if is_object {
            self.builder.start_node(Rule::ObjectInitializer);
            self.bump();
            while !self.eof() && !self.at("}") {
                self.builder.start_node(Rule::MemberInitializer);
                self.expect_ident();
                self.expect("=");
                if self.at("{") {
                    self.object_or_collection_initializer();
                } else {
                    self.expression();
                }
                self.builder.finish_node();
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            self.builder.start_node(Rule::CollectionInitializer);
            self.bump();
            while !self.eof() && !self.at("}") {
                if self.at("{") {
                    self.builder.start_node(Rule::ElementInitializer);
                    self.bump();
                    self.comma_separated_expressions("}");
                    self.expect("}");
                    self.builder.finish_node();
                } else {
                    self.expression();
                }
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect("}");
        self.builder.finish_node();
    }

    fn comma_separated_expressions(&mut self, close: &str) {
        while !self.eof() && !self.at(close) {
            self.expression();
            if self.at(",") {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn array_initializer(&mut self) {
        self.builder.start_node(Rule::ArrayInitializer);
        self.bump();
        while !self.eof() && !self.at("}") {
            if self.at("{") {
                self.array_initializer();
            } else {
                let start = self.pos;
                self.expression();
                if self.pos == start {
                    self.error_token();
                }
            }
            if self.at(",") {
                self.bump();
            } else {
                break;
            }
        }
        self.expect("}");
        self.builder.finish_node();
    }

    fn argument_list(&mut self, open: &str, close: &str) {
        self.builder.start_node(Rule::ArgumentList);
        self.expect(open);
        if !self.at(close) {
            loop {
                self.builder.start_node(Rule::Argument);
                if self.at_ident() && self.nth_is(1, ":") {
                    self.bump();
                    self.bump();
                }
                if self.at("ref") || self.at("out") {
                    self.bump();
                }
                self.expression();
                self.builder.finish_node();
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(close);
        self.builder.finish_node();
    }

    fn lambda(&mut self) {
        self.builder.start_node(Rule::LambdaExpression);
        if self.at_ident() {
            self.builder.start_node(Rule::LambdaParameter);
            self.bump();
            self.builder.finish_node();
        } else {
            self.bump();
            while !self.eof() && !self.at(")") {
                self.builder.start_node(Rule::LambdaParameter);
                let explicit = self
                    .scan_type(self.pos)
                    .is_some_and(|end| self.tok_ident(end));
                if explicit {
                    self.type_reference();
                }
                self.expect_ident();
                self.builder.finish_node();
                if self.at(",") {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(")");
        }
        self.expect("=>");
        if self.at("{") {
            self.block();
        } else {
            self.expression();
        }
        self.builder.finish_node();
    }

    fn query(&mut self) {
        self.builder.start_node(Rule::QueryExpression);
        self.from_clause();
        while self.at_ident() {
            if self.at("from") {
                self.from_clause();
            } else if self.at("let") {
                self.builder.start_node(Rule::LetClause);
                self.bump();
                self.expect_ident();
                self.expect("=");
                self.expression();
                self.builder.finish_node();
            } else if self.at("where") {
                self.builder.start_node(Rule::WhereClause);
                self.bump();
                self.expression();
                self.builder.finish_node();
            } else if self.at("select") {
                self.builder.start_node(Rule::SelectClause);
                self.bump();
                self.expression();
                self.builder.finish_node();
                break;
            } else {
                break;
            }
        }
        self.builder.finish_node();
    }

    fn from_clause(&mut self) {
        self.builder.start_node(Rule::FromClause);
        self.bump();
        if !(self.at_ident() && self.nth_is(1, "in")) {
            self.type_reference();
        }
        self.expect_ident();
        self.expect("in");
        self.expression();
        self.builder.finish_node();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tree::NodeId;

    fn find(tree: &SyntaxTree, rule: Rule) -> Vec<NodeId> {
        let root = tree.root().unwrap();
        tree.descendants(root)
            .into_iter()
            .filter(|&n| tree.rule(n) == Some(rule))
            .collect()
    }

    #[test]
    fn test_parse_namespace_and_class() {
        let tree = parse("using System; namespace A.B { public class C<T> : Base<T> { T f; } }");
        assert_eq!(find(&tree, Rule::UsingDirective).len(), 1);
        assert_eq!(find(&tree, Rule::NamespaceDeclaration).len(), 1);
        let class = find(&tree, Rule::ClassDeclaration)[0];
        assert!(tree.find_child(class, Rule::Modifiers).is_some());
        assert!(tree.find_child(class, Rule::TypeParameterList).is_some());
        assert!(tree.find_child(class, Rule::BaseList).is_some());
        assert_eq!(find(&tree, Rule::FieldDeclaration).len(), 1);
        assert!(find(&tree, Rule::Error).is_empty());
    }

    #[test]
    fn test_parse_members() {
        let src = "class C {
            C(int x) : base(x) {}
            int P { get; set; }
            int this[int i] { get { return i; } }
            event Handler Changed;
            T M<T>(T a, params int[] rest) { return a; }
            const int K = 1;
        }";
        let tree = parse(src);
        assert_eq!(find(&tree, Rule::ConstructorDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::ConstructorInitializer).len(), 1);
        assert_eq!(find(&tree, Rule::PropertyDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::IndexerDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::EventDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::MethodDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::FieldDeclaration).len(), 1);
        assert_eq!(find(&tree, Rule::Accessor).len(), 3);
        assert!(find(&tree, Rule::Error).is_empty());
    }

    #[test]
    fn test_parse_expressions() {
        let src = "class C { void M() {
            var a = new[] { 1, 2, 3 };
            var b = new List<int> { 1, 2 };
            var c = new Point { X = 1 };
            var d = (long)a.Length + b.Count * 2;
            var e = xs.Select(x => x.Name);
            var f = from x in xs where x > 1 select x;
            Foo<int>(named: 5);
            int[] g = { 1 };
            var h = a[0] as object;
        } }";
        let tree = parse(src);
        assert_eq!(find(&tree, Rule::LocalVariableDeclaration).len(), 8);
        assert_eq!(find(&tree, Rule::ArrayCreation).len(), 1);
        assert_eq!(find(&tree, Rule::CollectionInitializer).len(), 1);
        assert_eq!(find(&tree, Rule::ObjectInitializer).len(), 1);
        assert_eq!(find(&tree, Rule::CastExpression).len(), 1);
        assert_eq!(find(&tree, Rule::LambdaExpression).len(), 1);
        assert_eq!(find(&tree, Rule::QueryExpression).len(), 1);
        assert_eq!(find(&tree, Rule::AsExpression).len(), 1);
        assert_eq!(find(&tree, Rule::ElementAccess).len(), 1);
        let call = find(&tree, Rule::InvocationExpression)
            .into_iter()
            .find(|&n| tree.text(n).starts_with("Foo"))
            .unwrap();
        let callee = tree.child(call, 0).unwrap();
        assert!(tree.find_child(callee, Rule::TypeArgumentList).is_some());
        assert!(find(&tree, Rule::Error).is_empty());
    }

    #[test]
    fn test_less_than_is_not_type_arguments() {
        let tree = parse("class C { bool M(int a, int b) { return a < b; } }");
        assert_eq!(find(&tree, Rule::BinaryExpression).len(), 1);
        assert!(find(&tree, Rule::TypeArgumentList).is_empty());
    }

    #[test]
    fn test_nullable_and_rank_suffixes() {
        let tree = parse("class C { int? a; string[,] b; }");
        let types = find(&tree, Rule::TypeReference);
        assert_eq!(tree.text(types[0]), "int?");
        assert_eq!(tree.text(types[1]), "string[,]");
        assert_eq!(find(&tree, Rule::RankSpecifier).len(), 1);
    }

    #[test]
    fn test_garbage_is_recovered() {
        let tree = parse("class C { ) int x; } ]");
        assert!(!find(&tree, Rule::Error).is_empty());
        assert_eq!(find(&tree, Rule::FieldDeclaration).len(), 1);
    }
}
