//! The Weft language pipeline: lexer, parser, compound expansion, flat
//! graph emission.
//!
//! [`Compiler`] owns the class registry and drives a full compilation:
//! parse the source into a provisional graph, expand compound classes,
//! resolve tunnels, and emit elements and connections to a
//! [`Router`](crate::graph::router::Router).

pub mod config;
pub mod error;
pub mod lexer;
pub mod token;
pub mod variables;

mod compile;
pub(crate) mod parser;

pub use error::{CompileErrors, Diagnostic, ErrorCollector, ErrorSink, Severity};

use crate::graph::registry::{ClassId, ClassRecord, ClassRegistry};
use crate::graph::router::{FlatGraph, Router};
use crate::graph::ElementClass;

use lexer::Lexer;
use parser::Parser;

/// Hook invoked once per accepted `require(...)` word.
pub trait LexerExtra {
    fn require(&mut self, word: &str, errh: &mut dyn ErrorSink) {
        let _ = (word, errh);
    }
}

/// The Weft compiler.
///
/// Primitive element classes are registered up front; `compile` may
/// then be called any number of times, and classes a source file
/// defines do not leak into the next compilation.
pub struct Compiler {
    registry: ClassRegistry,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            registry: ClassRegistry::new(),
        }
    }

    /// Register a primitive element class under its own name.
    pub fn add_primitive(&mut self, class: Box<dyn ElementClass>) -> ClassId {
        self.registry.add("", ClassRecord::Primitive(class))
    }

    /// Names of the classes currently in scope.
    pub fn class_names(&self) -> Vec<&str> {
        self.registry.class_names()
    }

    /// Compile `source` into a flat graph.
    ///
    /// `Err` carries the run's full diagnostic log when at least one
    /// error was reported. Use [`compile_into`](Self::compile_into) to
    /// keep the partial graph alongside the diagnostics.
    pub fn compile(&mut self, source: &str, filename: &str) -> Result<FlatGraph, CompileErrors> {
        let mut errh = ErrorCollector::new();
        let mut graph = FlatGraph::new();
        self.compile_into(source, filename, &mut graph, &mut errh, None);
        if errh.nerrors() > 0 {
            Err(CompileErrors {
                nerrors: errh.nerrors(),
                diagnostics: errh.into_diagnostics(),
            })
        } else {
            Ok(graph)
        }
    }

    /// Compile `source`, emitting into `router` and reporting through
    /// `errh`. Output is always produced on a best-effort basis; the
    /// compilation succeeded iff the sink observed no errors.
    pub fn compile_into(
        &mut self,
        source: &str,
        filename: &str,
        router: &mut dyn Router,
        errh: &mut dyn ErrorSink,
        extra: Option<&mut dyn LexerExtra>,
    ) {
        let cookie = self.registry.checkpoint();
        let lexer = Lexer::new(source, filename);
        let mut parser = Parser::new(lexer, &mut self.registry, errh, extra);
        parser.run();
        parser.into_router(router);
        self.registry.restore(cookie);
        self.registry.sweep();
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
