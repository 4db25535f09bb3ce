//! Compound element classes: user-defined classes whose body is itself
//! a graph, templated by formal parameters and by the `input`/`output`
//! pseudo-elements at body indices 0 and 1.

use crate::dsl::error::ErrorSink;
use crate::dsl::parser::{Parser, ScopeBuilder};
use crate::dsl::variables::VariableEnvironment;

use super::registry::{ClassId, TUNNEL_CLASS};

/// The body of one `elementclass` alternative.
///
/// Same-named records chain through `prev`, newest first; overload
/// selection walks that chain for an exact arity match.
#[derive(Debug, Clone)]
pub struct Compound {
    name: String,
    landmark: String,
    depth: i32,
    prev: Option<ClassId>,
    formals: Vec<String>,
    ninputs: usize,
    noutputs: usize,
    body: ScopeBuilder,
}

impl Compound {
    pub(crate) fn new(
        name: String,
        landmark: String,
        depth: i32,
        formals: Vec<String>,
        body: ScopeBuilder,
    ) -> Self {
        Self {
            name,
            landmark,
            depth,
            prev: None,
            formals,
            ninputs: 0,
            noutputs: 0,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn landmark(&self) -> &str {
        &self.landmark
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn prev(&self) -> Option<ClassId> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: Option<ClassId>) {
        self.prev = prev;
    }

    pub fn formals(&self) -> &[String] {
        &self.formals
    }

    pub fn nformals(&self) -> usize {
        self.formals.len()
    }

    pub fn ninputs(&self) -> usize {
        self.ninputs
    }

    pub fn noutputs(&self) -> usize {
        self.noutputs
    }

    pub fn matches(&self, ninputs: usize, noutputs: usize, nargs: usize) -> bool {
        self.ninputs == ninputs && self.noutputs == noutputs && self.formals.len() == nargs
    }

    /// Infer the port arity from uses of `input` and `output` in the
    /// body connections and report misuses: `ninputs` is one past the
    /// highest port `input` is read from, `noutputs` one past the
    /// highest port `output` is written to, and gaps are diagnosed.
    pub(crate) fn finish(&mut self, errh: &mut dyn ErrorSink) {
        debug_assert_eq!(self.body.names.first().map(String::as_str), Some("input"));
        debug_assert_eq!(self.body.names.get(1).map(String::as_str), Some("output"));

        let mut from_in: Vec<bool> = Vec::new();
        let mut to_out: Vec<bool> = Vec::new();
        let mut to_in = false;
        let mut from_out = false;
        for i in 0..self.body.conn_from.len() {
            let hf = self.body.conn_from[i];
            let ht = self.body.conn_to[i];

            if hf.elem == 0 {
                if from_in.len() <= hf.port {
                    from_in.resize(hf.port + 1, false);
                }
                from_in[hf.port] = true;
            } else if hf.elem == 1 {
                from_out = true;
            }

            if ht.elem == 1 {
                if to_out.len() <= ht.port {
                    to_out.resize(ht.port + 1, false);
                }
                to_out[ht.port] = true;
            } else if ht.elem == 0 {
                to_in = true;
            }
        }

        self.ninputs = from_in.len();
        if to_in {
            errh.error(
                &self.landmark,
                &format!(
                    "'{}' pseudoelement 'input' may only be used as output",
                    self.name
                ),
            );
        }
        for (port, used) in from_in.iter().enumerate() {
            if !used {
                errh.error(
                    &self.landmark,
                    &format!("compound element '{}' input {} unused", self.name, port),
                );
            }
        }

        self.noutputs = to_out.len();
        if from_out {
            errh.error(
                &self.landmark,
                &format!(
                    "'{}' pseudoelement 'output' may only be used as input",
                    self.name
                ),
            );
        }
        for (port, used) in to_out.iter().enumerate() {
            if !used {
                errh.error(
                    &self.landmark,
                    &format!("compound element '{}' output {} unused", self.name, port),
                );
            }
        }
    }

    pub fn signature(&self) -> String {
        signature(&self.name, self.ninputs, self.noutputs, self.formals.len())
    }

    /// Splice the body into the enclosing scope in place of element
    /// `which`. The element is retyped to a tunnel and becomes the
    /// external face; the body's `input`/`output` pseudo-elements become
    /// the internal faces, and everything else is materialised under a
    /// `name/` prefix with its configuration interpolated through `env`.
    pub(crate) fn expand_into(
        &self,
        parser: &mut Parser<'_, '_, '_, '_>,
        which: usize,
        env: &VariableEnvironment,
    ) {
        let ename = parser.builder.names[which].clone();
        let ename_slash = if ename.ends_with('/') {
            ename.clone()
        } else {
            format!("{ename}/")
        };

        parser.builder.classes[which] = TUNNEL_CLASS;
        let inner_input = format!("{ename_slash}input");
        let inner_output = format!("{ename_slash}output");
        parser.add_tunnel(&ename, &inner_input);
        parser.add_tunnel(&inner_output, &ename);

        let mut eidx_map: Vec<Option<usize>> = Vec::with_capacity(self.body.nelements());
        eidx_map.push(parser.builder.by_name.get(&inner_input).copied());
        eidx_map.push(parser.builder.by_name.get(&inner_output).copied());

        for i in 2..self.body.nelements() {
            let cname = format!("{}{}", ename_slash, self.body.names[i]);
            if let Some(&eidx) = parser.builder.by_name.get(&cname) {
                let here = parser.builder.landmarks[which].clone();
                let there = parser.builder.landmarks[eidx].clone();
                parser
                    .errh
                    .error(&here, &format!("redeclaration of element '{cname}'"));
                parser
                    .errh
                    .error(&there, &format!("'{cname}' previously declared here"));
                eidx_map.push(None);
            } else {
                if parser.registry.lookup(&cname).is_some() {
                    let here = parser.builder.landmarks[which].clone();
                    parser
                        .errh
                        .error(&here, &format!("'{cname}' is an element class"));
                }
                let configuration = env.interpolate(&self.body.configs[i]);
                let eidx = parser.get_element(
                    &cname,
                    self.body.classes[i],
                    &configuration,
                    Some(self.body.landmarks[i].clone()),
                );
                eidx_map.push(Some(eidx));
            }
        }

        for i in 0..self.body.conn_from.len() {
            let hf = self.body.conn_from[i];
            let ht = self.body.conn_to[i];
            if let (Some(from), Some(to)) = (eidx_map[hf.elem], eidx_map[ht.elem]) {
                parser.connect(from, Some(hf.port), to, Some(ht.port));
            }
        }
    }
}

/// Signature string `name[N arguments, I inputs, O outputs]` used in
/// overload diagnostics.
pub fn signature(name: &str, ninputs: usize, noutputs: usize, nargs: usize) -> String {
    let args = if nargs == 1 { "argument" } else { "arguments" };
    let ins = if ninputs == 1 { "input" } else { "inputs" };
    let outs = if noutputs == 1 { "output" } else { "outputs" };
    format!("{name}[{nargs} {args}, {ninputs} {ins}, {noutputs} {outs}]")
}
