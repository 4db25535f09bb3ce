//! Recursive-descent parser for Weft source.
//!
//! The parser drives the pull lexer statement by statement and builds a
//! provisional graph in a per-scope [`ScopeBuilder`]: elements,
//! connections, and tunnel endpoints. Entering a compound body swaps in
//! a fresh builder; leaving swaps the outer one back and stores the
//! finished body in the compound's class record. Syntax errors are
//! reported and the parser resynchronises at the next statement
//! boundary, so one bad statement never hides the rest of the file.

use std::collections::HashMap;
use std::mem;

use log::debug;

use crate::graph::compound::Compound;
use crate::graph::registry::{ClassId, ClassRecord, ClassRegistry, ERROR_CLASS, TUNNEL_CLASS};
use crate::graph::tunnel::Tunnels;
use crate::graph::{ErrorClass, Port};

use super::config::{parse_word, split_args};
use super::error::ErrorSink;
use super::lexer::Lexer;
use super::token::{LexKind, Lexeme};
use super::LexerExtra;

/// Mutable working state for one scope: the top level, or one
/// alternative of a compound body.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeBuilder {
    /// Class id of each element.
    pub(crate) classes: Vec<ClassId>,
    pub(crate) names: Vec<String>,
    pub(crate) configs: Vec<String>,
    pub(crate) landmarks: Vec<String>,
    pub(crate) by_name: HashMap<String, usize>,
    /// Parallel from/to arrays; entry `i` of each is one connection.
    pub(crate) conn_from: Vec<Port>,
    pub(crate) conn_to: Vec<Port>,
    pub(crate) tunnels: Tunnels,
    /// Element count below which compound boilerplate lives; anonymous
    /// numbering starts above it.
    pub(crate) anonymous_offset: usize,
}

impl ScopeBuilder {
    pub(crate) fn nelements(&self) -> usize {
        self.classes.len()
    }
}

pub(crate) struct Parser<'a, 'reg, 'e, 'x> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) registry: &'reg mut ClassRegistry,
    pub(crate) errh: &'e mut dyn ErrorSink,
    pub(crate) extra: Option<&'x mut dyn LexerExtra>,
    pub(crate) builder: ScopeBuilder,
    pub(crate) requirements: Vec<String>,
    compound_depth: i32,
}

impl<'a, 'reg, 'e, 'x> Parser<'a, 'reg, 'e, 'x> {
    pub(crate) fn new(
        lexer: Lexer<'a>,
        registry: &'reg mut ClassRegistry,
        errh: &'e mut dyn ErrorSink,
        extra: Option<&'x mut dyn LexerExtra>,
    ) -> Self {
        Self {
            lexer,
            registry,
            errh,
            extra,
            builder: ScopeBuilder::default(),
            requirements: Vec::new(),
            compound_depth: 0,
        }
    }

    /// Parse the whole source.
    pub(crate) fn run(&mut self) {
        while self.parse_statement(false) {}
    }

    fn lex(&mut self) -> Lexeme<'a> {
        self.lexer.lex(&mut *self.errh)
    }

    fn unlex(&mut self, t: Lexeme<'a>) {
        self.lexer.unlex(t);
    }

    fn expect(&mut self, kind: LexKind) -> bool {
        self.lexer.expect(kind, &mut *self.errh)
    }

    fn lex_config(&mut self) -> &'a str {
        self.lexer.lex_config(&mut *self.errh)
    }

    fn landmark(&self) -> String {
        self.lexer.landmark()
    }

    fn lerror(&mut self, message: &str) {
        let landmark = self.lexer.landmark();
        self.errh.error(&landmark, message);
    }

    fn force_class(&mut self, name: &str) -> ClassId {
        let landmark = self.lexer.landmark();
        self.registry.force(name, &landmark, &mut *self.errh)
    }

    // ELEMENTS

    /// Return the element bound to `name`, creating it if new. An
    /// explicit `landmark` records where the element was first
    /// mentioned; without one the current position is used.
    pub(crate) fn get_element(
        &mut self,
        name: &str,
        class: ClassId,
        configuration: &str,
        landmark: Option<String>,
    ) -> usize {
        if let Some(&e) = self.builder.by_name.get(name) {
            return e;
        }
        let e = self.builder.nelements();
        self.builder.by_name.insert(name.to_string(), e);
        self.builder.names.push(name.to_string());
        self.builder.configs.push(configuration.to_string());
        let landmark = landmark.unwrap_or_else(|| self.lexer.landmark());
        self.builder.landmarks.push(landmark);
        self.builder.classes.push(class);
        e
    }

    /// `C@<n>`, with `n` counted from the scope's anonymous offset and
    /// bumped until unique.
    fn anon_element_name(&self, class_name: &str) -> String {
        let mut n = self.builder.nelements() - self.builder.anonymous_offset + 1;
        let mut name = format!("{class_name}@{n}");
        while self.builder.by_name.contains_key(&name) {
            n += 1;
            name = format!("{class_name}@{n}");
        }
        name
    }

    /// `@Class<n>` for inline compound classes, disambiguated against
    /// the class-name map.
    fn anon_class_name(&self, prefix: &str) -> String {
        let mut n = self.builder.nelements() - self.builder.anonymous_offset + 1;
        let mut name = format!("{prefix}{n}");
        while self.registry.lookup(&name).is_some() {
            n += 1;
            name = format!("{prefix}{n}");
        }
        name
    }

    /// Record a connection; omitted ports default to 0.
    pub(crate) fn connect(
        &mut self,
        from_elem: usize,
        from_port: Option<usize>,
        to_elem: usize,
        to_port: Option<usize>,
    ) {
        self.builder
            .conn_from
            .push(Port::new(from_elem, from_port.unwrap_or(0)));
        self.builder
            .conn_to
            .push(Port::new(to_elem, to_port.unwrap_or(0)));
    }

    // PORT TUNNELS

    /// Declare a tunnel pair `name_in -> name_out`, adopting or creating
    /// tunnel-typed elements for both names.
    pub(crate) fn add_tunnel(&mut self, name_in: &str, name_out: &str) {
        let hin = Port::new(self.get_element(name_in, TUNNEL_CLASS, "", None), 0);
        let hout = Port::new(self.get_element(name_out, TUNNEL_CLASS, "", None), 0);

        let mut ok = true;
        if self.builder.classes[hin.elem] != TUNNEL_CLASS {
            self.lerror(&format!("redeclaration of element '{name_in}'"));
            let there = self.builder.landmarks[hin.elem].clone();
            self.errh
                .error(&there, &format!("'{name_in}' previously declared here"));
            ok = false;
        }
        if self.builder.classes[hout.elem] != TUNNEL_CLASS {
            self.lerror(&format!("redeclaration of element '{name_out}'"));
            let there = self.builder.landmarks[hout.elem].clone();
            self.errh
                .error(&there, &format!("'{name_out}' previously declared here"));
            ok = false;
        }
        if self.builder.tunnels.find(false, hin).is_some() {
            self.lerror(&format!(
                "redeclaration of connection tunnel input '{name_in}'"
            ));
            ok = false;
        }
        if self.builder.tunnels.find(true, hout).is_some() {
            self.lerror(&format!(
                "redeclaration of connection tunnel output '{name_out}'"
            ));
            ok = false;
        }
        if ok {
            self.builder.tunnels.add_pair(hin, hout);
        }
    }

    // STATEMENTS

    /// Parse one statement. Returns false at the end of the current
    /// scope: EOF at top level, `}` or `||` inside a compound body.
    fn parse_statement(&mut self, nested: bool) -> bool {
        let t = self.lex();
        match t.kind {
            LexKind::Ident | LexKind::Char('[') | LexKind::Char('{') => {
                self.unlex(t);
                self.parse_connection();
                true
            }
            LexKind::ElementClass => {
                self.parse_element_class();
                true
            }
            LexKind::Tunnel => {
                self.parse_tunnel_decl();
                true
            }
            LexKind::Require => {
                self.parse_require();
                true
            }
            LexKind::Char(';') => true,
            LexKind::Char('}') | LexKind::DoubleBar if nested => {
                self.unlex(t);
                false
            }
            LexKind::Eof => {
                if nested {
                    self.lerror("expected '}'");
                }
                false
            }
            _ => {
                self.lerror(&format!("syntax error near '{}'", t.text));
                true
            }
        }
    }

    /// `[N]` port annotation. `None` means no port was given; a
    /// malformed annotation reports and recovers to port 0 where it can.
    fn parse_port(&mut self) -> Option<usize> {
        let t = self.lex();
        if !t.is_char('[') {
            self.unlex(t);
            return None;
        }

        let tword = self.lex();
        if tword.is(LexKind::Ident) {
            let port = match tword.text.parse::<usize>() {
                Ok(port) => port,
                Err(_) => {
                    self.lerror("syntax error: port number should be integer");
                    0
                }
            };
            self.expect(LexKind::Char(']'));
            Some(port)
        } else if tword.is_char(']') {
            self.lerror("syntax error: expected port number");
            Some(0)
        } else {
            self.lerror("syntax error: expected port number");
            self.unlex(tword);
            None
        }
    }

    /// One element reference inside a connection chain: a class name
    /// (fresh anonymous element), an inline compound body, a declared
    /// element name, or the first name of an inline declaration.
    /// Returns `None` when the next token does not start an element.
    fn parse_element(&mut self, comma_ok: bool) -> Option<usize> {
        let t = self.lex();
        let (name, mut class) = match t.kind {
            LexKind::Ident => {
                let name = t.text.to_string();
                let class = self.registry.lookup(&name);
                (name, class)
            }
            LexKind::Char('{') => {
                let class = self.parse_compound(None);
                (self.registry.name_of(class).to_string(), Some(class))
            }
            _ => {
                self.unlex(t);
                return None;
            }
        };

        let mut configuration = String::new();
        let mut landmark = None;
        let tparen = self.lex();
        if tparen.is_char('(') {
            // the config may span lines; remember where it started
            landmark = Some(self.landmark());
            if class.is_none() {
                class = Some(self.force_class(&name));
            }
            configuration = self.lex_config().to_string();
            self.expect(LexKind::Char(')'));
        } else {
            self.unlex(tparen);
        }

        if let Some(class) = class {
            let anon = self.anon_element_name(&name);
            return Some(self.get_element(&anon, class, &configuration, landmark));
        }

        let existing = self.builder.by_name.get(&name).copied();
        let t2 = self.lex();
        self.unlex(t2);
        if t2.is(LexKind::DoubleColon) || (t2.is_char(',') && comma_ok) {
            self.parse_declaration(Some(name.clone()));
        } else if existing.is_none() {
            self.lerror(&format!("undeclared element '{name}' (first use this block)"));
            self.get_element(&name, ERROR_CLASS, "", None);
        }
        match self.builder.by_name.get(&name).copied() {
            Some(e) => Some(e),
            // the declaration failed before binding the name; keep the
            // chain alive with an error element
            None => Some(self.get_element(&name, ERROR_CLASS, "", None)),
        }
    }

    /// `name (, name)* :: class (config)?`. `first` carries a name the
    /// caller already consumed.
    fn parse_declaration(&mut self, first: Option<String>) {
        let mut decls: Vec<String> = Vec::new();
        let mut have_first = first.is_some();
        if let Some(first) = first {
            decls.push(first);
        }
        loop {
            if !have_first {
                let t = self.lex();
                if t.is(LexKind::Ident) {
                    decls.push(t.text.to_string());
                } else {
                    self.lerror("syntax error: expected element name");
                }
            }
            have_first = false;
            let tsep = self.lex();
            match tsep.kind {
                LexKind::Char(',') => continue,
                LexKind::DoubleColon => break,
                _ => {
                    self.lerror("syntax error: expected '::' or ','");
                    self.unlex(tsep);
                    return;
                }
            }
        }

        let landmark = self.landmark();
        let t = self.lex();
        let class = match t.kind {
            LexKind::Ident => self.force_class(t.text),
            LexKind::Char('{') => self.parse_compound(None),
            _ => {
                self.lerror("missing element type in declaration");
                return;
            }
        };

        let mut configuration = String::new();
        let t = self.lex();
        if t.is_char('(') {
            configuration = self.lex_config().to_string();
            self.expect(LexKind::Char(')'));
        } else {
            self.unlex(t);
        }

        for name in decls {
            if let Some(&e) = self.builder.by_name.get(&name) {
                self.lerror(&format!("redeclaration of element '{name}'"));
                // tunnel endpoints are created implicitly; no hint there
                if self.builder.classes[e] != TUNNEL_CLASS {
                    let there = self.builder.landmarks[e].clone();
                    self.errh.error(
                        &there,
                        &format!("element '{name}' previously declared here"),
                    );
                }
            } else if self.registry.lookup(&name).is_some() {
                self.lerror(&format!("'{name}' is an element class"));
            } else {
                self.get_element(&name, class, &configuration, Some(landmark.clone()));
            }
        }
    }

    /// A connection chain: `port? elem ('->' port? elem)*`. Returns
    /// true when at least one element was consumed.
    fn parse_connection(&mut self) -> bool {
        let mut element1: Option<usize> = None;
        let mut port1: Option<usize> = None;

        loop {
            let port2 = self.parse_port();
            let element2 = match self.parse_element(element1.is_none()) {
                Some(e) => e,
                None => {
                    if port1.is_some() {
                        self.lerror("output port useless at end of chain");
                    }
                    return element1.is_some();
                }
            };

            if let Some(e1) = element1 {
                self.connect(e1, port1, element2, port2);
            } else if port2.is_some() {
                self.lerror("input port useless at start of chain");
            }

            port1 = None;

            loop {
                let t = self.lex();
                match t.kind {
                    LexKind::Char(',') | LexKind::DoubleColon => {
                        self.lerror(&format!("syntax error before '{}'", t.text));
                    }
                    LexKind::Arrow => break,
                    LexKind::Char('[') => {
                        self.unlex(t);
                        port1 = self.parse_port();
                    }
                    LexKind::Ident
                    | LexKind::Char('{')
                    | LexKind::Char('}')
                    | LexKind::DoubleBar
                    | LexKind::Tunnel
                    | LexKind::ElementClass
                    | LexKind::Require => {
                        self.unlex(t);
                        if port1.is_some() {
                            self.lerror("output port useless at end of chain");
                        }
                        return true;
                    }
                    LexKind::Char(';') | LexKind::Eof => {
                        if port1.is_some() {
                            self.lerror("output port useless at end of chain");
                        }
                        return true;
                    }
                    _ => {
                        self.lerror(&format!("syntax error near '{}'", t.text));
                        // keep meaningful tokens for the next statement
                        if !matches!(t.kind, LexKind::Char(_)) {
                            self.unlex(t);
                        }
                        return true;
                    }
                }
            }

            element1 = Some(element2);
        }
    }

    /// `elementclass name { body }` or `elementclass name Other`
    /// (synonym).
    fn parse_element_class(&mut self) {
        let tname = self.lex();
        let name = if tname.is(LexKind::Ident) {
            Some(tname.text.to_string())
        } else {
            self.unlex(tname);
            self.lerror("expected element type name");
            None
        };

        let tnext = self.lex();
        if tnext.is_char('{') {
            self.parse_compound(name);
        } else if tnext.is(LexKind::Ident) {
            let target = self.force_class(tnext.text);
            let id = self
                .registry
                .add(name.as_deref().unwrap_or(""), ClassRecord::Synonym(target));
            debug!("defined synonym class '{}'", self.registry.name_of(id));
        } else {
            self.lerror(&format!("syntax error near '{}'", tnext.text));
            self.registry.add(
                name.as_deref().unwrap_or(""),
                ClassRecord::Primitive(Box::new(ErrorClass)),
            );
        }
    }

    /// `connectiontunnel in -> out (, in -> out)*`.
    fn parse_tunnel_decl(&mut self) {
        loop {
            let tname1 = self.lex();
            let name1 = if tname1.is(LexKind::Ident) {
                Some(tname1.text.to_string())
            } else {
                self.unlex(tname1);
                self.lerror("expected port name");
                None
            };

            self.expect(LexKind::Arrow);

            let tname2 = self.lex();
            let name2 = if tname2.is(LexKind::Ident) {
                Some(tname2.text.to_string())
            } else {
                self.unlex(tname2);
                self.lerror("expected port name");
                None
            };

            if let (Some(name1), Some(name2)) = (name1, name2) {
                self.add_tunnel(&name1, &name2);
            }

            let t = self.lex();
            if !t.is_char(',') {
                self.unlex(t);
                return;
            }
        }
    }

    /// `require(word, ...)`: words accumulate at top level and feed the
    /// optional hook.
    fn parse_require(&mut self) {
        if !self.expect(LexKind::Char('(')) {
            return;
        }
        let requirement = self.lex_config().to_string();
        for arg in split_args(&requirement) {
            match parse_word(&arg) {
                None => self.lerror("bad requirement: should be a single word"),
                Some(word) => {
                    if let Some(extra) = self.extra.as_mut() {
                        extra.require(word, &mut *self.errh);
                    }
                    self.requirements.push(word.to_string());
                }
            }
        }
        self.expect(LexKind::Char(')'));
    }

    /// `$formal (, $formal)* |` at the head of a compound body.
    fn parse_compound_formals(&mut self, formals: &mut Vec<String>) {
        loop {
            let tvar = self.lex();
            if !tvar.is(LexKind::Variable) {
                self.unlex(tvar);
                return;
            }
            formals.push(tvar.text.to_string());
            let tsep = self.lex();
            if tsep.is_char('|') {
                return;
            }
            if !tsep.is_char(',') {
                self.lerror("expected ',' or '|'");
                self.unlex(tsep);
                return;
            }
        }
    }

    /// Compound body after its `{`: `('...' '||')? (formals '|')?
    /// statements ('||' alternative)* '}'`.
    ///
    /// Every alternative becomes its own class record; all of them are
    /// registered under the name only once the closing `}` is reached,
    /// so the class is not visible inside its own bodies. Class records
    /// defined inside a body are popped from scope at body exit.
    fn parse_compound(&mut self, name: Option<String>) -> ClassId {
        let name = name.unwrap_or_else(|| self.anon_class_name("@Class"));

        // a leading '...' extends the existing class of this name
        let t = self.lex();
        let mut extension = None;
        if t.is(LexKind::Ellipsis) {
            if self.registry.lookup(&name).is_none() {
                self.lerror(&format!("extending unknown element class '{name}'"));
                self.registry
                    .add(&name, ClassRecord::Primitive(Box::new(ErrorClass)));
            }
            extension = self.registry.lookup(&name);
            self.expect(LexKind::DoubleBar);
        } else {
            self.unlex(t);
        }

        let mut alternatives: Vec<Compound> = Vec::new();
        loop {
            let saved = mem::take(&mut self.builder);
            self.get_element("input", TUNNEL_CLASS, "", None);
            self.get_element("output", TUNNEL_CLASS, "", None);
            self.builder.anonymous_offset = 2;
            let body_landmark = self.landmark();
            let checkpoint = self.registry.checkpoint();
            self.compound_depth += 1;

            let mut formals = Vec::new();
            self.parse_compound_formals(&mut formals);
            while self.parse_statement(true) {}

            self.compound_depth -= 1;
            self.registry.restore(checkpoint);
            let body = mem::replace(&mut self.builder, saved);

            let mut compound = Compound::new(
                name.clone(),
                body_landmark,
                self.compound_depth,
                formals,
                body,
            );
            compound.finish(&mut *self.errh);
            alternatives.push(compound);

            // consumes the closing '}' when the body is done
            let t = self.lex();
            if !t.is(LexKind::DoubleBar) {
                break;
            }
        }

        let mut prev = extension;
        let mut newest = ERROR_CLASS;
        for mut compound in alternatives {
            compound.set_prev(prev);
            newest = self.registry.add(&name, ClassRecord::Compound(compound));
            prev = Some(newest);
        }
        debug!("defined compound class '{name}'");
        self.registry
            .check_duplicates(newest, extension, &mut *self.errh);
        newest
    }
}

#[cfg(test)]
mod tests {
    use crate::dsl::error::ErrorCollector;
    use crate::dsl::Compiler;
    use crate::graph::router::FlatGraph;
    use crate::graph::OpaqueClass;

    fn compiler() -> Compiler {
        let mut compiler = Compiler::new();
        for name in ["Id", "Src", "Sink"] {
            compiler.add_primitive(Box::new(OpaqueClass::new(name)));
        }
        compiler
    }

    fn compile_collect(src: &str) -> (FlatGraph, ErrorCollector) {
        let mut compiler = compiler();
        let mut graph = FlatGraph::new();
        let mut errh = ErrorCollector::new();
        compiler.compile_into(src, "test", &mut graph, &mut errh, None);
        (graph, errh)
    }

    #[test]
    fn redeclaration_keeps_one_element() {
        let (graph, errh) = compile_collect("a :: Id; a :: Id;");
        assert_eq!(errh.nerrors(), 2);
        assert!(errh.diagnostics()[0]
            .message
            .contains("redeclaration of element 'a'"));
        assert!(errh.diagnostics()[1]
            .message
            .contains("element 'a' previously declared here"));
        assert_eq!(graph.elements.len(), 1);
        assert_eq!(graph.elements[0].name, "a");
        assert_eq!(graph.elements[0].class_name, "Id");
    }

    #[test]
    fn undeclared_element_becomes_error_placeholder() {
        let (graph, errh) = compile_collect("ghost -> Sink;");
        assert_eq!(errh.nerrors(), 1);
        assert!(errh.diagnostics()[0]
            .message
            .contains("undeclared element 'ghost'"));
        assert_eq!(graph.elements[0].class_name, "Error");
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn element_name_clashing_with_class_is_rejected() {
        let (_, errh) = compile_collect("a, Id :: Src;");
        assert_eq!(errh.nerrors(), 1);
        assert!(errh.diagnostics()[0]
            .message
            .contains("'Id' is an element class"));
    }

    #[test]
    fn dangling_ports_are_reported() {
        let (_, errh) = compile_collect("[1] Id; a :: Id; a [0];");
        let messages: Vec<&str> = errh
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert!(messages
            .iter()
            .any(|m| m.contains("input port useless at start of chain")));
        assert!(messages
            .iter()
            .any(|m| m.contains("output port useless at end of chain")));
    }

    #[test]
    fn multi_declaration_shares_class_and_config() {
        let (graph, errh) = compile_collect("a, b, c :: Id(64); a -> b -> c;");
        assert_eq!(errh.nerrors(), 0);
        assert_eq!(graph.elements.len(), 3);
        assert!(graph.elements.iter().all(|e| e.configuration == "64"));
        assert_eq!(graph.connections.len(), 2);
    }

    #[test]
    fn statement_recovery_continues_parsing() {
        let (graph, errh) = compile_collect("-> ; a :: Id; b :: Id; a -> b;");
        assert!(errh.nerrors() > 0);
        assert_eq!(graph.elements.len(), 2);
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn tunnel_redeclaration_is_reported() {
        let (_, errh) =
            compile_collect("connectiontunnel a -> b; connectiontunnel a -> c; Src -> a; b -> Sink; c -> Sink;");
        assert!(errh
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("redeclaration of connection tunnel input 'a'")));
    }

    #[test]
    fn class_names_are_scoped_to_compound_bodies() {
        let (_, errh) =
            compile_collect("elementclass O { elementclass I { input -> output; } input -> output; } x :: I;");
        assert!(errh
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("unknown element class 'I'")));
    }
}
