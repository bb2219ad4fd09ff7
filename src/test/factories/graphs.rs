//! Functions with characteristic control-flow shapes.
//!
//! Every block holds at least one statement named after the block (`b<id>`), so tests
//! can find out which case a block was lowered into.

use crate::{
    analysis::BlockId,
    ir::{Function, FunctionBuilder, NodeId, NodeKind, PhiMove, PlainOp},
};

fn mark(builder: &mut FunctionBuilder, block: BlockId) {
    builder
        .append(
            block,
            NodeKind::Plain(PlainOp::effect(format!("b{}", block.index()), vec![])),
        )
        .unwrap();
}

fn blocks(builder: &mut FunctionBuilder, count: usize) -> Vec<BlockId> {
    (0..count)
        .map(|_| {
            let block = builder.add_block().unwrap();
            mark(builder, block);
            block
        })
        .collect()
}

fn value(builder: &mut FunctionBuilder, name: &str) -> NodeId {
    builder.add_value(PlainOp::value(name, vec![])).unwrap()
}

/// `b0 -> b1 -> ... -> b(len-1)`; the last block ends without a `return`.
pub fn linear_chain(len: usize) -> Function {
    let mut builder = FunctionBuilder::new("linear");
    let b = blocks(&mut builder, len);
    for pair in b.windows(2) {
        builder.jump(pair[0], pair[1]).unwrap();
    }
    builder.build().unwrap()
}

/// `b0 -if-> {b1, b2} -> b3`, both arms merging a value into `b3`.
pub fn diamond() -> Function {
    let mut builder = FunctionBuilder::new("diamond");
    let b = blocks(&mut builder, 4);
    let cond = value(&mut builder, "cond");
    let phi = builder.add_phi().unwrap();
    let one = value(&mut builder, "one");
    let two = value(&mut builder, "two");

    builder.branch_if(b[0], cond, b[1], b[2], 0.5).unwrap();
    for (arm, source) in [(b[1], one), (b[2], two)] {
        builder
            .append(
                arm,
                NodeKind::MergeEnd {
                    phi_moves: vec![PhiMove {
                        target: phi,
                        source,
                    }],
                },
            )
            .unwrap();
        builder.jump(arm, b[3]).unwrap();
    }
    builder
        .append(b[3], NodeKind::Plain(PlainOp::effect("return", vec![phi])))
        .unwrap();
    builder.build().unwrap()
}

/// A counting loop over the phi `i` (node 6), starting at `zero()`:
///
/// ```text
/// b0 (MergeEnd) -> b1 (LoopBegin, if) -> b2 (LoopEnd) -> b1
///                                     -> b3 (LoopExit, return i)
/// ```
pub fn counting_loop() -> Function {
    let mut builder = FunctionBuilder::new("loop");
    let b = blocks(&mut builder, 4);
    let more = value(&mut builder, "more");
    let zero = value(&mut builder, "zero");
    let i = builder.add_phi().unwrap();
    let next = builder.add_value(PlainOp::value("inc", vec![i])).unwrap();

    builder
        .append(
            b[0],
            NodeKind::MergeEnd {
                phi_moves: vec![PhiMove {
                    target: i,
                    source: zero,
                }],
            },
        )
        .unwrap();
    builder.jump(b[0], b[1]).unwrap();
    let begin = builder.append(b[1], NodeKind::LoopBegin).unwrap();
    builder.branch_if(b[1], more, b[2], b[3], 0.9).unwrap();
    builder
        .append(
            b[2],
            NodeKind::LoopEnd {
                loop_begin: begin,
                phi_moves: vec![PhiMove {
                    target: i,
                    source: next,
                }],
            },
        )
        .unwrap();
    builder.jump(b[2], b[1]).unwrap();
    builder
        .append(b[3], NodeKind::LoopExit { loop_begin: begin })
        .unwrap();
    builder
        .append(b[3], NodeKind::Plain(PlainOp::effect("return", vec![i])))
        .unwrap();
    builder.build().unwrap()
}

/// A cycle `b1 <-> b2` entered at both blocks:
///
/// ```text
/// b0 -if-> b1, b2;  b1 -> b2;  b2 -if-> b1, b3
/// ```
pub fn irreducible() -> Function {
    let mut builder = FunctionBuilder::new("irreducible");
    let b = blocks(&mut builder, 4);
    let c0 = value(&mut builder, "c0");
    let c2 = value(&mut builder, "c2");

    builder.branch_if(b[0], c0, b[1], b[2], 0.5).unwrap();
    builder.jump(b[1], b[2]).unwrap();
    builder.branch_if(b[2], c2, b[1], b[3], 0.5).unwrap();
    builder.build().unwrap()
}

/// `b0` switches over `keys` to one block per key, plus a default block if requested.
/// Every target jumps to a shared exit.
pub fn switch_dispatch(keys: &[i32], with_default: bool) -> Function {
    let mut builder = FunctionBuilder::new("switch");
    let targets = keys.len() + usize::from(with_default);
    let b = blocks(&mut builder, targets + 2);
    let exit = b[targets + 1];
    let subject = value(&mut builder, "subject");

    let cases: Vec<(i32, BlockId)> = keys
        .iter()
        .zip(&b[1..])
        .map(|(&key, &block)| (key, block))
        .collect();
    let default = with_default.then(|| b[targets]);
    builder.switch(b[0], subject, &cases, default).unwrap();
    for &target in &b[1..=targets] {
        builder.jump(target, exit).unwrap();
    }
    builder.build().unwrap()
}

/// `b0` calls `risky()` continuing at `b1`, or at the handler `b2` when it throws.
pub fn invoke_with_handler() -> Function {
    let mut builder = FunctionBuilder::new("invoke");
    let b = blocks(&mut builder, 4);

    builder
        .invoke_with_exception(b[0], PlainOp::value("risky", vec![]), b[1], b[2])
        .unwrap();
    builder.jump(b[1], b[3]).unwrap();
    builder.jump(b[2], b[3]).unwrap();
    builder.build().unwrap()
}
