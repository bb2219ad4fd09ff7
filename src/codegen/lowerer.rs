//! Rendering of individual nodes.
//!
//! The control-flow lowering decides where code goes; a [`NodeLowerer`] decides what
//! a single node looks like. [`TextLowerer`] is a small reference implementation that
//! renders every operation as a call.

use crate::{
    codegen::emitter::CodeEmitter,
    ir::{Function, Node, NodeId, NodeKind, PlainOp},
    Result,
};

/// Renders nodes and values for a [`CodeEmitter`].
///
/// Implementations must be thread-safe so one lowerer can serve functions lowered in
/// parallel.
pub trait NodeLowerer: Send + Sync {
    /// Returns `true` if `node` must be emitted as a statement of its block.
    ///
    /// Nodes for which this returns `false` still count as visited; their value is
    /// expected to be rendered at its uses.
    fn is_statement(&self, function: &Function, node: &Node) -> bool;

    /// Emits `node` as one or more statements.
    ///
    /// Called for plain statement nodes and, inside the try block, for the call of an
    /// `InvokeWithException`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be rendered or the emitter fails.
    fn lower_statement(
        &self,
        function: &Function,
        node: &Node,
        out: &mut dyn CodeEmitter,
    ) -> Result<()>;

    /// Returns an expression referring to the value of `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist or produces no value.
    fn value_expr(&self, function: &Function, node: NodeId) -> Result<String>;

    /// Emits the value transfers of a `LoopEnd` or `MergeEnd`.
    ///
    /// # Errors
    ///
    /// Returns an error if the moves cannot be rendered or the emitter fails.
    fn resolve_phis(&self, function: &Function, end: &Node, out: &mut dyn CodeEmitter)
        -> Result<()>;

    /// Emits the declarations the cases share, such as the variables phis are assigned
    /// to. Called once per function, before the first case is opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the emitter fails.
    fn declare_locals(&self, _function: &Function, _out: &mut dyn CodeEmitter) -> Result<()> {
        Ok(())
    }

    /// Returns `true` if `node` leaves the function, like `return` or `throw`.
    ///
    /// A block without successors must end in such a node: the case it is lowered
    /// into has no dispatch write, and one that does not end in an exit is closed
    /// with a trap instead of falling into the next case.
    fn is_exit(&self, _function: &Function, _node: &Node) -> bool {
        false
    }
}

/// Reference [`NodeLowerer`] producing JavaScript-like text.
///
/// - a scheduled value becomes `var v<id> = mnemonic(args);` and is referenced as
///   `v<id>`
/// - a scheduled effect becomes `mnemonic(args);`, except `return` and `throw`, which
///   become the corresponding statements
/// - a floating value is rendered inline at each use as `mnemonic(args)`
/// - a phi is declared once as `var v<id>;` and referenced as `v<id>`
/// - a phi move becomes `v<target> = <source>;`
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLowerer;

impl TextLowerer {
    /// Creates the lowerer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render_op(&self, function: &Function, op: &PlainOp) -> Result<String> {
        let args = op
            .inputs
            .iter()
            .map(|&input| self.value_expr(function, input))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}({})", op.mnemonic, args.join(", ")))
    }
}

impl NodeLowerer for TextLowerer {
    fn is_statement(&self, _function: &Function, node: &Node) -> bool {
        matches!(
            node.kind(),
            NodeKind::Plain(_) | NodeKind::InvokeWithException { .. }
        )
    }

    fn lower_statement(
        &self,
        function: &Function,
        node: &Node,
        out: &mut dyn CodeEmitter,
    ) -> Result<()> {
        let op = match node.kind() {
            NodeKind::Plain(op) | NodeKind::InvokeWithException { call: op, .. } => op,
            other => {
                return Err(lowering_error!(
                    "{} node {} is not a statement",
                    other.name(),
                    node.id()
                ))
            }
        };

        let text = match op.mnemonic.as_str() {
            "return" | "throw" if !op.produces_value => {
                let args = op
                    .inputs
                    .iter()
                    .map(|&input| self.value_expr(function, input))
                    .collect::<Result<Vec<_>>>()?;
                if args.is_empty() {
                    format!("{};", op.mnemonic)
                } else {
                    format!("{} {};", op.mnemonic, args.join(", "))
                }
            }
            _ if op.produces_value => {
                format!("var v{} = {};", node.id().index(), self.render_op(function, op)?)
            }
            _ => format!("{};", self.render_op(function, op)?),
        };
        out.statement(&text)
    }

    fn value_expr(&self, function: &Function, node: NodeId) -> Result<String> {
        let Some(target) = function.node(node) else {
            return Err(lowering_error!("node {} does not exist", node));
        };

        match (target.kind(), target.block()) {
            (NodeKind::Plain(op), None) => self.render_op(function, op),
            (NodeKind::Plain(op), Some(_)) if !op.produces_value => Err(lowering_error!(
                "node {} ({}) produces no value",
                node,
                op.mnemonic
            )),
            _ => Ok(format!("v{}", node.index())),
        }
    }

    fn resolve_phis(
        &self,
        function: &Function,
        end: &Node,
        out: &mut dyn CodeEmitter,
    ) -> Result<()> {
        let Some(moves) = end.kind().phi_moves() else {
            return Err(lowering_error!(
                "{} node {} carries no phi moves",
                end.kind().name(),
                end.id()
            ));
        };

        for phi in moves {
            let source = self.value_expr(function, phi.source)?;
            out.statement(&format!("v{} = {};", phi.target.index(), source))?;
        }
        Ok(())
    }

    fn declare_locals(&self, function: &Function, out: &mut dyn CodeEmitter) -> Result<()> {
        for node in function.nodes() {
            if *node.kind() == NodeKind::Phi {
                out.statement(&format!("var v{};", node.id().index()))?;
            }
        }
        Ok(())
    }

    fn is_exit(&self, _function: &Function, node: &Node) -> bool {
        match node.kind() {
            NodeKind::Plain(op) => {
                !op.produces_value && matches!(op.mnemonic.as_str(), "return" | "throw")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codegen::emitter::{EmitOp, RecordingEmitter},
        ir::{FunctionBuilder, PhiMove},
    };

    #[test]
    fn test_text_rendering() {
        let mut builder = FunctionBuilder::new("f");
        let b = builder.add_block().unwrap();
        let x = builder.add_value(PlainOp::value("param", vec![])).unwrap();
        let acc = builder.add_phi().unwrap();
        let sum = builder
            .append(b, NodeKind::Plain(PlainOp::value("add", vec![x, acc])))
            .unwrap();
        let print = builder
            .append(b, NodeKind::Plain(PlainOp::effect("print", vec![sum])))
            .unwrap();
        let end = builder
            .append(
                b,
                NodeKind::MergeEnd {
                    phi_moves: vec![PhiMove {
                        target: acc,
                        source: sum,
                    }],
                },
            )
            .unwrap();
        let ret = builder
            .append(b, NodeKind::Plain(PlainOp::effect("return", vec![acc])))
            .unwrap();
        let function = builder.build().unwrap();

        let lowerer = TextLowerer::new();
        let mut out = RecordingEmitter::new();
        lowerer.declare_locals(&function, &mut out).unwrap();
        for id in [sum, print, ret] {
            lowerer.lower_statement(&function, &function[id], &mut out).unwrap();
        }
        lowerer.resolve_phis(&function, &function[end], &mut out).unwrap();

        assert_eq!(
            out.ops(),
            &[
                EmitOp::Statement("var v1;".to_string()),
                EmitOp::Statement("var v2 = add(param(), v1);".to_string()),
                EmitOp::Statement("print(v2);".to_string()),
                EmitOp::Statement("return v1;".to_string()),
                EmitOp::Statement("v1 = v2;".to_string()),
            ]
        );
        assert!(lowerer.is_exit(&function, &function[ret]));
        assert!(!lowerer.is_exit(&function, &function[print]));
        assert!(!lowerer.is_exit(&function, &function[sum]));
    }

    #[test]
    fn test_value_of_effect_is_rejected() {
        let mut builder = FunctionBuilder::new("f");
        let b = builder.add_block().unwrap();
        let effect = builder
            .append(b, NodeKind::Plain(PlainOp::effect("store", vec![])))
            .unwrap();
        let function = builder.build().unwrap();

        let lowerer = TextLowerer::new();
        assert!(lowerer.value_expr(&function, effect).is_err());
        assert!(lowerer.value_expr(&function, NodeId::new(40)).is_err());
        assert!(lowerer.is_statement(&function, &function[effect]));
    }
}
