//! Syntax tree produced alongside the context tree.

use crate::context::{ContextId, Position, ScopeKind};
use crate::tokenizer::TokenKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyntaxKind {
    Root { grammar: String },
    Scope(ScopeKind),
    Embedded { language: String },
    Token(TokenKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub position: Position,
    pub context: ContextId,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn leaf(kind: TokenKind, text: &str, position: Position, context: ContextId) -> Self {
        SyntaxNode {
            kind: SyntaxKind::Token(kind),
            text: Some(text.to_owned()),
            position,
            context,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SyntaxNode::node_count).sum::<usize>()
    }

    /// Depth-first search for the first node matching `pred`.
    pub fn find(&self, pred: &dyn Fn(&SyntaxNode) -> bool) -> Option<&SyntaxNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(pred))
    }
}

/// Builds the tree incrementally as scopes open and close.
#[derive(Debug, Clone)]
pub struct SyntaxBuilder {
    open: Vec<SyntaxNode>,
}

impl SyntaxBuilder {
    pub fn new(grammar: &str) -> Self {
        SyntaxBuilder {
            open: vec![SyntaxNode {
                kind: SyntaxKind::Root {
                    grammar: grammar.to_owned(),
                },
                text: None,
                position: Position::default(),
                context: ContextId(0),
                children: Vec::new(),
            }],
        }
    }

    pub fn open(&mut self, kind: SyntaxKind, position: Position, context: ContextId) {
        self.open.push(SyntaxNode {
            kind,
            text: None,
            position,
            context,
            children: Vec::new(),
        });
    }

    pub fn push_leaf(&mut self, node: SyntaxNode) {
        if let Some(top) = self.open.last_mut() {
            top.children.push(node);
        }
    }

    /// Close the innermost open node. The root is never closed.
    pub fn close(&mut self) {
        if self.open.len() > 1 {
            if let Some(node) = self.open.pop() {
                self.push_leaf(node);
            }
        }
    }

    /// Close everything still open and return the root.
    pub fn finish(mut self) -> SyntaxNode {
        while self.open.len() > 1 {
            self.close();
        }
        self.open.pop().unwrap_or_else(|| SyntaxBuilder::new("").open.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_closes_dangling_scopes() {
        let mut b = SyntaxBuilder::new("G");
        b.open(SyntaxKind::Scope(ScopeKind::Block), Position::default(), ContextId(1));
        b.push_leaf(SyntaxNode::leaf(
            TokenKind::Identifier,
            "x",
            Position::default(),
            ContextId(1),
        ));
        let root = b.finish();
        assert_eq!(root.node_count(), 3);
        assert!(root
            .find(&|n| n.text.as_deref() == Some("x"))
            .is_some_and(|n| n.context == ContextId(1)));
    }
}
