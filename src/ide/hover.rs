//! Hover information.

use crate::base::{FileId, LineCol, TextRange, TextSize};
use crate::hir::{ResolveError, SemanticModel, SymbolKind};
use crate::syntax::{NodeRef, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverResult {
    /// Tooltip text, e.g. `(field) int C.count`.
    pub contents: String,
    /// Documentation id (`T:N.C`, `M:N.C.M(System.Int32)`, ...) when the
    /// symbol has one.
    pub documentation_key: Option<String>,
    pub range: TextRange,
    pub start: LineCol,
    pub end: LineCol,
}

pub(crate) fn hover(
    model: &mut SemanticModel,
    file: FileId,
    offset: TextSize,
) -> Result<Option<HoverResult>, ResolveError> {
    let source = model.file(file).ok_or(ResolveError::UnknownFile(file))?;
    let tree = source.tree.clone();
    let line_index = source.line_index.clone();

    let Some(leaf) = tree.leaf_at(offset) else {
        return Ok(None);
    };
    let Some(token) = tree.token(leaf) else {
        return Ok(None);
    };
    if matches!(token.kind, TokenKind::Punct | TokenKind::Error) {
        return Ok(None);
    }
    let range = token.range;

    let sym = model.resolve_node(NodeRef::new(file, leaf));
    let symbol = model.symbol(sym);
    if symbol.is_sentinel() || symbol.kind == SymbolKind::Error {
        return Ok(None);
    }
    // Literals and other value-producing tokens show their type.
    let target = if symbol.kind == SymbolKind::Instance { model.type_of(sym) } else { sym };
    let contents = model.tooltip_text(target);
    let documentation_key = model.documentation_key(target);
    let (start, end) = line_index.range(range);
    Ok(Some(HoverResult {
        contents,
        documentation_key,
        range,
        start,
        end,
    }))
}
