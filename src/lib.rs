// Copyright 2025 The flatcfg Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # flatcfg
//!
//! Control-flow linearization for code generators that target structured languages.
//!
//! Many compilation targets (JavaScript, most high-level languages, some bytecode
//! formats) have no arbitrary jump. An intermediate representation, however, describes
//! control flow as a graph, and that graph may be irreducible. `flatcfg` bridges the
//! two by lowering every function into a single *dispatch loop*:
//!
//! ```text
//! let control = <start>;
//! while (true) {
//!   switch (control) {
//!     case 0: { ...; control = 2; continue; }
//!     case 2: { ...; if (c) { control = 0; continue; } else { control = 3; continue; } }
//!     case 3: { ...; return v; }
//!     default: throw new Error("unreachable");
//!   }
//! }
//! ```
//!
//! Every basic block owns one `case`, and every edge becomes a write to the dispatch
//! variable followed by `continue`. Straight-line chains of blocks are folded into a
//! single case ("block inlining"), so the dispatch round-trip is only paid at merge
//! points and branches.
//!
//! ## Architecture
//!
//! - [`analysis`] - The immutable block graph: dense compact block ids, predecessor and
//!   successor edges, the dominator tree and the loop forest.
//! - [`ir`] - The IR node model: a closed [`ir::NodeKind`] enum and [`ir::Function`],
//!   which ties nodes to the blocks they belong to.
//! - [`codegen`] - The [`codegen::GraphWalker`] driver, the pluggable
//!   [`codegen::ControlFlowLowering`] strategy with its dispatch-loop implementation,
//!   the [`codegen::CodeEmitter`] and [`codegen::NodeLowerer`] collaborator traits, and
//!   the post-lowering verifier.
//!
//! ## Quick Start
//!
//! ```rust
//! use flatcfg::prelude::*;
//!
//! let mut builder = FunctionBuilder::new("sum");
//! let entry = builder.add_block()?;
//! let body = builder.add_block()?;
//!
//! let x = builder.add_value(PlainOp::value("param", vec![]))?;
//! builder.append(entry, NodeKind::Plain(PlainOp::effect("log", vec![x])))?;
//! builder.jump(entry, body)?;
//! builder.append(body, NodeKind::Plain(PlainOp::effect("return", vec![x])))?;
//!
//! let function = builder.build()?;
//! let source = lower_to_source(&function, &LoweringConfig::default(), &TextLowerer::new())?;
//! assert!(source.contains("log(param());"));
//! assert!(source.contains("return param();"));
//! # Ok::<(), flatcfg::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Invariant violations inside the lowering
//! (a block visited twice, a dispatch target without a case label, an id that does not
//! fit the compact id width) are reported as retryable errors: the caller may abandon
//! this compilation attempt and retry with a less aggressive pipeline. A failed
//! verification is never retryable.
//!
//! ## Thread Safety
//!
//! A [`ir::Function`] is immutable after construction and can be shared across threads.
//! Each lowering owns its visited set, visit log and output, so independent functions
//! can be lowered concurrently; see [`codegen::lower_functions`].

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use flatcfg::prelude::*;
///
/// let config = LoweringConfig::default();
/// assert_eq!(config.dispatch_variable, "control");
/// ```
pub mod prelude;

/// Block graph model: compact block ids, edges, dominators and loops.
///
/// # Key Types
///
/// - [`analysis::BlockGraph`] - Immutable-after-construction array of basic blocks
/// - [`analysis::BlockGraphBuilder`] - Validating builder for block graphs
/// - [`analysis::BlockId`] - Compact (`u16`) dense block identifier
/// - [`analysis::LoopForest`] / [`analysis::Loop`] - Natural loop nesting structure
pub mod analysis;

/// IR node model and functions.
///
/// # Key Types
///
/// - [`ir::Function`] - A block graph plus the IR nodes that live in its blocks
/// - [`ir::FunctionBuilder`] - Builder that keeps nodes, blocks and edges consistent
/// - [`ir::NodeKind`] - Closed set of node kinds the lowering distinguishes
pub mod ir;

/// Control-flow lowering: the graph walker, the dispatch-loop strategy and the
/// collaborator traits for emission, node lowering and verification.
pub mod codegen;

/// Internal utilities.
pub(crate) mod utils;

/// `flatcfg` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `flatcfg` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use flatcfg::{analysis::BlockId, Error};
///
/// match BlockId::try_from(70_000usize) {
///     Err(Error::GraphTooLarge { limit, .. }) => assert_eq!(limit, 65_535),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
pub use error::{Error, VerificationFailure};
