//! Weft: a compiler for a small declarative language that wires
//! processing elements into a directed graph.
//!
//! A source file names elements, assigns them to classes (with optional
//! configuration strings), and connects their numbered ports:
//!
//! ```text
//! src :: Source;
//! q :: Queue(64);
//! src -> q -> [0] Sink;
//! ```
//!
//! User-defined compound classes (`elementclass`), connection tunnels
//! (`connectiontunnel`), and `require` directives are resolved away by
//! the compiler. The result is a flat list of primitive elements and
//! port-to-port connections, delivered through the
//! [`graph::router::Router`] interface; [`FlatGraph`] is the built-in
//! receiver.
//!
//! Primitive element classes are opaque to the compiler: callers
//! register [`ElementClass`] factories up front and get fresh instances
//! back in the emitted graph.

pub mod dsl;
pub mod graph;

pub use dsl::{CompileErrors, Compiler, ErrorCollector, ErrorSink};
pub use graph::router::{FlatGraph, Router};
pub use graph::{ElementClass, OpaqueClass};
