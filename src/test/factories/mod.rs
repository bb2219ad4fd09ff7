//! Function factories for unit tests.

mod graphs;

pub use graphs::*;
