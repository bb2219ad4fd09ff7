//! Code emission primitives.
//!
//! The lowering drives a [`CodeEmitter`] through a fixed set of structured primitives
//! and never reads its output back. Two implementations ship with the crate:
//!
//! - [`JsEmitter`] - writes indented JavaScript source
//! - [`RecordingEmitter`] - records every call as an [`EmitOp`], for tests and for
//!   callers that render the result themselves
//!
//! Block-opening primitives (`begin_*`) must be balanced by their closing primitive;
//! emitters are free to assume so.

use std::fmt::Write;

use strum::IntoStaticStr;

use crate::Result;

/// A streaming, write-only sink for structured code.
pub trait CodeEmitter {
    /// Declares a mutable integer variable: `let name = value;`.
    fn declare_int(&mut self, name: &str, value: i64) -> Result<()>;

    /// Assigns an integer literal to a variable: `name = value;`.
    fn assign_int(&mut self, name: &str, value: i64) -> Result<()>;

    /// Opens a switch over the expression `subject`.
    fn begin_switch(&mut self, subject: &str) -> Result<()>;

    /// Closes the innermost switch.
    fn end_switch(&mut self) -> Result<()>;

    /// Opens a `case label:` arm.
    fn begin_case(&mut self, label: i64) -> Result<()>;

    /// Opens the `default:` arm.
    fn begin_default(&mut self) -> Result<()>;

    /// Closes the current case or default arm.
    fn end_case(&mut self) -> Result<()>;

    /// Opens `if (condition) {`.
    fn begin_if(&mut self, condition: &str) -> Result<()>;

    /// Switches to the else branch of the innermost if.
    fn begin_else(&mut self) -> Result<()>;

    /// Closes the innermost if.
    fn end_if(&mut self) -> Result<()>;

    /// Opens a try block.
    fn begin_try(&mut self) -> Result<()>;

    /// Closes the try block and opens a catch block binding the exception to `binding`.
    fn begin_catch(&mut self, binding: &str) -> Result<()>;

    /// Closes the catch block.
    fn end_try(&mut self) -> Result<()>;

    /// Opens an infinite loop.
    fn begin_loop(&mut self) -> Result<()>;

    /// Closes the innermost infinite loop.
    fn end_loop(&mut self) -> Result<()>;

    /// Continues the enclosing infinite loop.
    fn continue_loop(&mut self) -> Result<()>;

    /// Emits one already-lowered statement.
    fn statement(&mut self, text: &str) -> Result<()>;

    /// Emits a comment.
    fn comment(&mut self, text: &str) -> Result<()>;

    /// Emits a statement that traps if it is ever executed.
    fn unreachable(&mut self, message: &str) -> Result<()>;
}

/// Writes JavaScript source into a string.
///
/// # Examples
///
/// ```rust
/// use flatcfg::codegen::{CodeEmitter, JsEmitter};
///
/// let mut js = JsEmitter::new();
/// js.declare_int("control", 0)?;
/// js.begin_loop()?;
/// js.continue_loop()?;
/// js.end_loop()?;
/// assert_eq!(js.finish(), "let control = 0;\nwhile (true) {\n  continue;\n}\n");
/// # Ok::<(), flatcfg::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct JsEmitter {
    out: String,
    depth: usize,
    indent: &'static str,
}

impl Default for JsEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEmitter {
    /// Creates an emitter indenting with two spaces.
    #[must_use]
    pub fn new() -> Self {
        Self::with_indent("  ")
    }

    /// Creates an emitter using `indent` for each nesting level.
    #[must_use]
    pub fn with_indent(indent: &'static str) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            indent,
        }
    }

    /// Returns the source written so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Consumes the emitter and returns the source.
    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) -> Result<()> {
        for _ in 0..self.depth {
            self.out.push_str(self.indent);
        }
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    fn open(&mut self, text: &str) -> Result<()> {
        self.line(text)?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, text: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        self.line(text)
    }
}

impl CodeEmitter for JsEmitter {
    fn declare_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.line(&format!("let {name} = {value};"))
    }

    fn assign_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.line(&format!("{name} = {value};"))
    }

    fn begin_switch(&mut self, subject: &str) -> Result<()> {
        self.open(&format!("switch ({subject}) {{"))
    }

    fn end_switch(&mut self) -> Result<()> {
        self.close("}")
    }

    fn begin_case(&mut self, label: i64) -> Result<()> {
        self.open(&format!("case {label}: {{"))
    }

    fn begin_default(&mut self) -> Result<()> {
        self.open("default: {")
    }

    fn end_case(&mut self) -> Result<()> {
        self.close("}")
    }

    fn begin_if(&mut self, condition: &str) -> Result<()> {
        self.open(&format!("if ({condition}) {{"))
    }

    fn begin_else(&mut self) -> Result<()> {
        self.close("} else {")?;
        self.depth += 1;
        Ok(())
    }

    fn end_if(&mut self) -> Result<()> {
        self.close("}")
    }

    fn begin_try(&mut self) -> Result<()> {
        self.open("try {")
    }

    fn begin_catch(&mut self, binding: &str) -> Result<()> {
        self.close(&format!("}} catch ({binding}) {{"))?;
        self.depth += 1;
        Ok(())
    }

    fn end_try(&mut self) -> Result<()> {
        self.close("}")
    }

    fn begin_loop(&mut self) -> Result<()> {
        self.open("while (true) {")
    }

    fn end_loop(&mut self) -> Result<()> {
        self.close("}")
    }

    fn continue_loop(&mut self) -> Result<()> {
        self.line("continue;")
    }

    fn statement(&mut self, text: &str) -> Result<()> {
        self.line(text)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.line(&format!("// {text}"))
    }

    fn unreachable(&mut self, message: &str) -> Result<()> {
        self.line(&format!("throw new Error({message:?});"))
    }
}

/// One primitive call recorded by [`RecordingEmitter`].
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum EmitOp {
    /// `declare_int(name, value)`
    DeclareInt {
        /// Variable name
        name: String,
        /// Initial value
        value: i64,
    },
    /// `assign_int(name, value)`
    AssignInt {
        /// Variable name
        name: String,
        /// Assigned value
        value: i64,
    },
    /// `begin_switch(subject)`
    BeginSwitch(String),
    /// `end_switch()`
    EndSwitch,
    /// `begin_case(label)`
    BeginCase(i64),
    /// `begin_default()`
    BeginDefault,
    /// `end_case()`
    EndCase,
    /// `begin_if(condition)`
    BeginIf(String),
    /// `begin_else()`
    BeginElse,
    /// `end_if()`
    EndIf,
    /// `begin_try()`
    BeginTry,
    /// `begin_catch(binding)`
    BeginCatch(String),
    /// `end_try()`
    EndTry,
    /// `begin_loop()`
    BeginLoop,
    /// `end_loop()`
    EndLoop,
    /// `continue_loop()`
    ContinueLoop,
    /// `statement(text)`
    Statement(String),
    /// `comment(text)`
    Comment(String),
    /// `unreachable(message)`
    Unreachable(String),
}

impl EmitOp {
    /// Returns the name of the primitive, e.g. `"BeginCase"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Records emitted primitives instead of rendering them.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    ops: Vec<EmitOp>,
}

impl RecordingEmitter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded primitives in call order.
    #[must_use]
    pub fn ops(&self) -> &[EmitOp] {
        &self.ops
    }

    /// Consumes the recorder and returns the recorded primitives.
    #[must_use]
    pub fn into_ops(self) -> Vec<EmitOp> {
        self.ops
    }

    /// Returns every value assigned to `variable`, the declaration included.
    #[must_use]
    pub fn values_of(&self, variable: &str) -> Vec<i64> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                EmitOp::DeclareInt { name, value } | EmitOp::AssignInt { name, value }
                    if name == variable =>
                {
                    Some(*value)
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the number of `assign_int` calls targeting `variable`.
    #[must_use]
    pub fn assignment_count(&self, variable: &str) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, EmitOp::AssignInt { name, .. } if name == variable))
            .count()
    }

    /// Returns the case labels of the outermost switch, in emission order.
    #[must_use]
    pub fn outer_case_labels(&self) -> Vec<i64> {
        let mut depth = 0usize;
        let mut labels = Vec::new();
        for op in &self.ops {
            match op {
                EmitOp::BeginSwitch(_) => depth += 1,
                EmitOp::EndSwitch => depth = depth.saturating_sub(1),
                EmitOp::BeginCase(label) if depth == 1 => labels.push(*label),
                _ => {}
            }
        }
        labels
    }

    /// Returns the statements emitted inside the outermost-switch case `label`.
    #[must_use]
    pub fn statements_in_case(&self, label: i64) -> Vec<String> {
        let mut switch_depth = 0usize;
        let mut case_depth = 0usize;
        let mut inside = false;
        let mut statements = Vec::new();
        for op in &self.ops {
            match op {
                EmitOp::BeginSwitch(_) => switch_depth += 1,
                EmitOp::EndSwitch => switch_depth = switch_depth.saturating_sub(1),
                EmitOp::BeginCase(l) if switch_depth == 1 && case_depth == 0 => {
                    inside = *l == label;
                    case_depth = 1;
                    continue;
                }
                EmitOp::BeginDefault if switch_depth == 1 && case_depth == 0 => {
                    inside = false;
                    case_depth = 1;
                    continue;
                }
                EmitOp::BeginCase(_) | EmitOp::BeginDefault => case_depth += 1,
                EmitOp::EndCase => {
                    case_depth = case_depth.saturating_sub(1);
                    if case_depth == 0 {
                        inside = false;
                    }
                }
                EmitOp::Statement(text) if inside => statements.push(text.clone()),
                _ => {}
            }
        }
        statements
    }

    fn record(&mut self, op: EmitOp) -> Result<()> {
        log::trace!("emit {}", op.name());
        self.ops.push(op);
        Ok(())
    }
}

impl CodeEmitter for RecordingEmitter {
    fn declare_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.record(EmitOp::DeclareInt {
            name: name.to_string(),
            value,
        })
    }

    fn assign_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.record(EmitOp::AssignInt {
            name: name.to_string(),
            value,
        })
    }

    fn begin_switch(&mut self, subject: &str) -> Result<()> {
        self.record(EmitOp::BeginSwitch(subject.to_string()))
    }

    fn end_switch(&mut self) -> Result<()> {
        self.record(EmitOp::EndSwitch)
    }

    fn begin_case(&mut self, label: i64) -> Result<()> {
        self.record(EmitOp::BeginCase(label))
    }

    fn begin_default(&mut self) -> Result<()> {
        self.record(EmitOp::BeginDefault)
    }

    fn end_case(&mut self) -> Result<()> {
        self.record(EmitOp::EndCase)
    }

    fn begin_if(&mut self, condition: &str) -> Result<()> {
        self.record(EmitOp::BeginIf(condition.to_string()))
    }

    fn begin_else(&mut self) -> Result<()> {
        self.record(EmitOp::BeginElse)
    }

    fn end_if(&mut self) -> Result<()> {
        self.record(EmitOp::EndIf)
    }

    fn begin_try(&mut self) -> Result<()> {
        self.record(EmitOp::BeginTry)
    }

    fn begin_catch(&mut self, binding: &str) -> Result<()> {
        self.record(EmitOp::BeginCatch(binding.to_string()))
    }

    fn end_try(&mut self) -> Result<()> {
        self.record(EmitOp::EndTry)
    }

    fn begin_loop(&mut self) -> Result<()> {
        self.record(EmitOp::BeginLoop)
    }

    fn end_loop(&mut self) -> Result<()> {
        self.record(EmitOp::EndLoop)
    }

    fn continue_loop(&mut self) -> Result<()> {
        self.record(EmitOp::ContinueLoop)
    }

    fn statement(&mut self, text: &str) -> Result<()> {
        self.record(EmitOp::Statement(text.to_string()))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.record(EmitOp::Comment(text.to_string()))
    }

    fn unreachable(&mut self, message: &str) -> Result<()> {
        self.record(EmitOp::Unreachable(message.to_string()))
    }
}
