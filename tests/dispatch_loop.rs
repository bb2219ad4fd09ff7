//! Dispatch-loop lowering integration tests.
//!
//! These tests drive the complete pipeline through the public API:
//! 1. Build a function with `FunctionBuilder`
//! 2. Lower it with `GraphWalker` (or the free entry points)
//! 3. Check the emitted primitives or JavaScript against the dispatch-loop contract
//!    (case count, inlining, dispatch writes, verification)

use flatcfg::prelude::*;

/// Builds `count` blocks, each starting with a statement naming the block.
fn blocks(builder: &mut FunctionBuilder, count: usize) -> Result<Vec<BlockId>> {
    (0..count)
        .map(|_| {
            let block = builder.add_block()?;
            builder.append(
                block,
                NodeKind::Plain(PlainOp::effect(format!("b{}", block.index()), vec![])),
            )?;
            Ok(block)
        })
        .collect()
}

/// Lowers `function` with the default walker into a recorder.
fn record(
    function: &Function,
    config: &LoweringConfig,
) -> Result<(RecordingEmitter, LoweringStats)> {
    let mut out = RecordingEmitter::new();
    let stats = GraphWalker::new().lower(function, config, &TextLowerer::new(), &mut out)?;
    Ok((out, stats))
}

/// `abs(x)`: one branch, two returning arms.
fn abs_function() -> Result<Function> {
    let mut builder = FunctionBuilder::new("abs");
    let entry = builder.add_block()?;
    let negative = builder.add_block()?;
    let positive = builder.add_block()?;
    let x = builder.add_value(PlainOp::value("param", vec![]))?;
    let cond = builder.add_value(PlainOp::value("lt0", vec![x]))?;
    let neg = builder.add_value(PlainOp::value("neg", vec![x]))?;

    builder.branch_if(entry, cond, negative, positive, 0.5)?;
    builder.append(negative, NodeKind::Plain(PlainOp::effect("return", vec![neg])))?;
    builder.append(positive, NodeKind::Plain(PlainOp::effect("return", vec![x])))?;
    builder.build()
}

/// Nested loops: `b1` heads the outer loop, `b2` the inner one.
///
/// ```text
/// b0 -> b1 -if-> b2 -if-> b3 -> b2
///          \        \-> b4 -> b1
///           \-> b5
/// ```
fn nested_loops() -> Result<Function> {
    let mut builder = FunctionBuilder::new("nested");
    let b = blocks(&mut builder, 6)?;
    let outer_cond = builder.add_value(PlainOp::value("outer", vec![]))?;
    let inner_cond = builder.add_value(PlainOp::value("inner", vec![]))?;

    builder.jump(b[0], b[1])?;
    let outer = builder.append(b[1], NodeKind::LoopBegin)?;
    builder.branch_if(b[1], outer_cond, b[2], b[5], 0.9)?;
    let inner = builder.append(b[2], NodeKind::LoopBegin)?;
    builder.branch_if(b[2], inner_cond, b[3], b[4], 0.9)?;
    builder.append(
        b[3],
        NodeKind::LoopEnd {
            loop_begin: inner,
            phi_moves: vec![],
        },
    )?;
    builder.jump(b[3], b[2])?;
    builder.append(b[4], NodeKind::LoopExit { loop_begin: inner })?;
    builder.append(
        b[4],
        NodeKind::LoopEnd {
            loop_begin: outer,
            phi_moves: vec![],
        },
    )?;
    builder.jump(b[4], b[1])?;
    builder.append(b[5], NodeKind::LoopExit { loop_begin: outer })?;
    builder.build()
}

#[test]
fn test_abs_javascript() -> Result<()> {
    let function = abs_function()?;
    let source = lower_to_source(&function, &LoweringConfig::default(), &TextLowerer::new())?;

    let expected = "\
let control = 0;
while (true) {
  switch (control) {
    case 0: {
      if (lt0(param())) {
        control = 1;
        continue;
      } else {
        control = 2;
        continue;
      }
    }
    case 1: {
      return neg(param());
    }
    case 2: {
      return param();
    }
    default: {
      throw new Error(\"unreachable dispatch state\");
    }
  }
}
";
    assert_eq!(source, expected);
    Ok(())
}

#[test]
fn test_linear_chain_is_one_case() -> Result<()> {
    let mut builder = FunctionBuilder::new("linear");
    let b = blocks(&mut builder, 3)?;
    builder.jump(b[0], b[1])?;
    builder.jump(b[1], b[2])?;
    let function = builder.build()?;

    let (out, stats) = record(&function, &LoweringConfig::default())?;
    assert_eq!(stats.strategy, "dispatch-loop");
    assert_eq!(stats.cases, 1);
    assert_eq!(stats.inlined_blocks, 2);
    assert_eq!(stats.dispatch_writes, 0);
    assert_eq!(out.assignment_count("control"), 0);
    assert_eq!(
        out.ops()[0],
        EmitOp::DeclareInt {
            name: "control".to_string(),
            value: 0
        }
    );
    Ok(())
}

#[test]
fn test_inlining_can_be_disabled() -> Result<()> {
    let mut builder = FunctionBuilder::new("linear");
    let b = blocks(&mut builder, 3)?;
    builder.jump(b[0], b[1])?;
    builder.jump(b[1], b[2])?;
    let function = builder.build()?;

    let config = LoweringConfig {
        inline_blocks: false,
        ..LoweringConfig::default()
    };
    let (out, stats) = record(&function, &config)?;
    assert_eq!(out.outer_case_labels(), vec![0, 1, 2]);
    assert_eq!(out.values_of("control"), vec![0, 1, 2]);
    assert_eq!(stats.inlined_blocks, 0);
    Ok(())
}

#[test]
fn test_start_block_is_never_inlined() -> Result<()> {
    // b0 is the only way into b1, but b1 is where dispatch starts
    let mut builder = FunctionBuilder::new("rotated");
    let b = blocks(&mut builder, 3)?;
    builder.set_start(b[1])?;
    builder.jump(b[1], b[2])?;
    builder.jump(b[2], b[0])?;
    builder.jump(b[0], b[1])?;
    let function = builder.build()?;

    let (out, stats) = record(&function, &LoweringConfig::default())?;
    assert_eq!(stats.cases, 1);
    assert_eq!(stats.inlined_blocks, 2);
    assert_eq!(out.outer_case_labels(), vec![1]);
    assert_eq!(out.statements_in_case(1), vec!["b1();", "b2();", "b0();"]);
    // declaration, then b0 -> b1
    assert_eq!(out.values_of("control"), vec![1, 1]);
    Ok(())
}

#[test]
fn test_nested_loops() -> Result<()> {
    let function = nested_loops()?;
    let graph = function.graph();

    let forest = graph.loops();
    assert_eq!(forest.len(), 2);
    let outer = forest.loop_for_header(BlockId::new(1)).expect("outer loop");
    let inner = forest.loop_for_header(BlockId::new(2)).expect("inner loop");
    assert_eq!(outer.depth(), 1);
    assert_eq!(inner.depth(), 2);
    assert!(inner.is_declared_exit(BlockId::new(4)));
    assert!(outer.is_declared_exit(BlockId::new(5)));

    let (out, stats) = record(&function, &LoweringConfig::compact())?;
    assert_eq!(stats.omitted_markers, 4);
    assert_eq!(stats.phi_resolutions, 2);
    assert!(!out.ops().iter().any(|op| matches!(op, EmitOp::Comment(_))));

    let labels = out.outer_case_labels();
    for value in out.values_of("control") {
        assert!(labels.contains(&value));
    }
    Ok(())
}

#[test]
fn test_irreducible_graph_lowers() -> Result<()> {
    let mut builder = FunctionBuilder::new("irreducible");
    let b = blocks(&mut builder, 4)?;
    let c0 = builder.add_value(PlainOp::value("c0", vec![]))?;
    let c2 = builder.add_value(PlainOp::value("c2", vec![]))?;
    builder.branch_if(b[0], c0, b[1], b[2], 0.5)?;
    builder.jump(b[1], b[2])?;
    builder.branch_if(b[2], c2, b[1], b[3], 0.5)?;
    let function = builder.build()?;

    assert!(function.graph().has_irreducible_cycles());
    let (out, stats) = record(&function, &LoweringConfig::default())?;
    assert_eq!(stats.cases, 4);
    let labels = out.outer_case_labels();
    for value in out.values_of("control") {
        assert!(labels.contains(&value));
    }
    Ok(())
}

#[test]
fn test_switch_without_default() -> Result<()> {
    let mut builder = FunctionBuilder::new("switch");
    let b = blocks(&mut builder, 3)?;
    let v = builder.add_value(PlainOp::value("tag", vec![]))?;
    builder.switch(b[0], v, &[(4, b[1]), (-2, b[2])], None)?;
    let function = builder.build()?;

    let source = lower_to_source(&function, &LoweringConfig::default(), &TextLowerer::new())?;
    assert!(source.contains("switch (tag()) {"));
    assert!(source.contains("case -2: {"));
    assert!(source.contains("throw new Error(\"no switch key matched\");"));
    Ok(())
}

#[test]
fn test_exception_edge() -> Result<()> {
    let mut builder = FunctionBuilder::new("guarded");
    let b = blocks(&mut builder, 3)?;
    builder.invoke_with_exception(b[0], PlainOp::effect("risky", vec![]), b[1], b[2])?;
    let function = builder.build()?;

    assert!(function.graph()[b[2]].is_exception_entry());
    let config = LoweringConfig {
        exception_binding: "err".to_string(),
        ..LoweringConfig::default()
    };
    let source = lower_to_source(&function, &config, &TextLowerer::new())?;
    assert!(source.contains("try {\n        risky();\n        control = 1;"));
    assert!(source.contains("} catch (err) {\n        control = 2;"));
    Ok(())
}

#[test]
fn test_single_block_fast_path() -> Result<()> {
    let mut builder = FunctionBuilder::new("leaf");
    let only = builder.add_block()?;
    let x = builder.add_value(PlainOp::value("param", vec![]))?;
    builder.append(only, NodeKind::Plain(PlainOp::effect("return", vec![x])))?;
    let function = builder.build()?;

    let fast = lower_to_source(&function, &LoweringConfig::default(), &TextLowerer::new())?;
    assert_eq!(fast, "return param();\n");

    let (_, stats) = record(&function, &LoweringConfig::debug())?;
    assert_eq!(stats.strategy, "dispatch-loop");
    assert_eq!(stats.cases, 1);
    Ok(())
}

#[test]
fn test_custom_dispatch_variable() -> Result<()> {
    let function = abs_function()?;
    let config = LoweringConfig {
        dispatch_variable: "state".to_string(),
        ..LoweringConfig::default()
    };
    let (out, _) = record(&function, &config)?;
    assert_eq!(out.values_of("state"), vec![0, 1, 2]);
    assert_eq!(out.assignment_count("control"), 0);
    Ok(())
}

#[test]
fn test_lower_many_functions() -> Result<()> {
    let mut functions = Vec::new();
    for i in 0..16 {
        let mut builder = FunctionBuilder::new(format!("f{i}"));
        let b = blocks(&mut builder, 2 + i % 3)?;
        for pair in b.windows(2) {
            builder.jump(pair[0], pair[1])?;
        }
        functions.push(builder.build()?);
    }
    functions.push(abs_function()?);

    let results = lower_functions(&functions, &LoweringConfig::default(), &TextLowerer::new());
    assert_eq!(results.len(), functions.len());
    for (function, result) in functions.iter().zip(results) {
        let lowered = result?;
        assert_eq!(lowered.name, function.name());
        assert!(lowered.source.starts_with("let control = 0;\n"));
        assert_eq!(
            lowered.stats.cases,
            function.graph().block_count() - lowered.stats.inlined_blocks
        );
    }
    Ok(())
}

/// Forgets every block but the start.
struct ForgetfulLowering;

impl ControlFlowLowering for ForgetfulLowering {
    fn name(&self) -> &'static str {
        "forgetful"
    }

    fn lower(&self, ctx: &mut WalkContext<'_>) -> Result<()> {
        let start = ctx.function().graph().start_block();
        ctx.mark_visited(start)?;
        ctx.lower_block_body(start)?;
        Ok(())
    }
}

#[test]
fn test_custom_strategy_is_checked() -> Result<()> {
    let function = abs_function()?;
    let walker = GraphWalker::with_strategy(Box::new(ForgetfulLowering));
    assert_eq!(walker.strategy_name(), "forgetful");

    let mut out = RecordingEmitter::new();
    let error = walker
        .lower(
            &function,
            &LoweringConfig::default(),
            &TextLowerer::new(),
            &mut out,
        )
        .unwrap_err();
    assert!(matches!(error, Error::Lowering { .. }));
    assert!(error.is_retryable());
    Ok(())
}

#[test]
fn test_too_many_blocks() -> Result<()> {
    let mut builder = FunctionBuilder::new("huge");
    for _ in 0..=BlockId::MAX_INDEX {
        builder.add_block()?;
    }

    let error = builder.add_block().unwrap_err();
    assert!(matches!(error, Error::GraphTooLarge { what: "block id", .. }));
    assert!(error.is_retryable());
    Ok(())
}

#[test]
fn test_predecessor_with_higher_id_inlines() -> Result<()> {
    // b1's only way in is b2, which has the higher id
    let mut builder = FunctionBuilder::new("out_of_order");
    let b = blocks(&mut builder, 4)?;
    let flag = builder.add_value(PlainOp::value("flag", vec![]))?;
    builder.branch_if(b[0], flag, b[2], b[3], 0.5)?;
    builder.jump(b[2], b[1])?;
    let function = builder.build()?;

    let (out, stats) = record(&function, &LoweringConfig::default())?;
    assert_eq!(stats.inlined_blocks, 1);
    assert_eq!(out.outer_case_labels(), vec![0, 2, 3]);
    assert_eq!(out.statements_in_case(2), vec!["b2();", "b1();"]);
    assert_eq!(out.values_of("control"), vec![0, 2, 3]);
    Ok(())
}

#[test]
fn test_loop_carried_value_javascript() -> Result<()> {
    // i = 0; while (more()) { i = inc(i); } return i;
    let mut builder = FunctionBuilder::new("count");
    let entry = builder.add_block()?;
    let header = builder.add_block()?;
    let body = builder.add_block()?;
    let exit = builder.add_block()?;
    let zero = builder.add_value(PlainOp::value("zero", vec![]))?;
    let more = builder.add_value(PlainOp::value("more", vec![]))?;
    let i = builder.add_phi()?;
    let next = builder.add_value(PlainOp::value("inc", vec![i]))?;

    builder.append(
        entry,
        NodeKind::MergeEnd {
            phi_moves: vec![PhiMove {
                target: i,
                source: zero,
            }],
        },
    )?;
    builder.jump(entry, header)?;
    let begin = builder.append(header, NodeKind::LoopBegin)?;
    builder.branch_if(header, more, body, exit, 0.9)?;
    builder.append(
        body,
        NodeKind::LoopEnd {
            loop_begin: begin,
            phi_moves: vec![PhiMove {
                target: i,
                source: next,
            }],
        },
    )?;
    builder.jump(body, header)?;
    builder.append(exit, NodeKind::LoopExit { loop_begin: begin })?;
    builder.append(exit, NodeKind::Plain(PlainOp::effect("return", vec![i])))?;
    let function = builder.build()?;

    let source = lower_to_source(&function, &LoweringConfig::compact(), &TextLowerer::new())?;
    let expected = "\
let control = 0;
var v2;
while (true) {
  switch (control) {
    case 0: {
      v2 = zero();
      control = 1;
      continue;
    }
    case 1: {
      if (more()) {
        control = 2;
        continue;
      } else {
        control = 3;
        continue;
      }
    }
    case 2: {
      v2 = inc(v2);
      control = 1;
      continue;
    }
    case 3: {
      return v2;
    }
    default: {
      throw new Error(\"unreachable dispatch state\");
    }
  }
}
";
    assert_eq!(source, expected);
    Ok(())
}
