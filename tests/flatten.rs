//! End-to-end tests: Weft source in, flat element/connection graph out.

use weft::dsl::{Compiler, ErrorCollector, ErrorSink, LexerExtra};
use weft::graph::OpaqueClass;
use weft::FlatGraph;

const CLASSES: &[&str] = &["Id", "Src", "Sink", "Queue"];

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    for name in CLASSES {
        compiler.add_primitive(Box::new(OpaqueClass::new(*name)));
    }
    compiler
}

fn flatten(src: &str) -> FlatGraph {
    compiler().compile(src, "test.weft").expect("compile failed")
}

/// (from, from_port, to, to_port) by element name, order-insensitive.
fn edges(graph: &FlatGraph) -> Vec<(String, usize, String, usize)> {
    let mut out: Vec<_> = graph
        .connections
        .iter()
        .map(|c| {
            (
                graph.elements[c.from].name.clone(),
                c.from_port,
                graph.elements[c.to].name.clone(),
                c.to_port,
            )
        })
        .collect();
    out.sort();
    out
}

fn edge(from: &str, fp: usize, to: &str, tp: usize) -> (String, usize, String, usize) {
    (from.to_string(), fp, to.to_string(), tp)
}

#[test]
fn declared_elements_and_connections() {
    let graph = flatten("a :: Id; b :: Id; a -> b;");
    let names: Vec<&str> = graph.elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(edges(&graph), vec![edge("a", 0, "b", 0)]);
}

#[test]
fn anonymous_elements_and_port_annotations() {
    let graph = flatten("Id -> [2] Id;");
    let names: Vec<&str> = graph.elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Id@1", "Id@2"]);
    assert_eq!(edges(&graph), vec![edge("Id@1", 0, "Id@2", 2)]);
}

#[test]
fn compound_with_formals() {
    let graph = flatten(
        "elementclass C { $x | in :: Id($x); input -> in -> output; }\n\
         c :: C(7); src :: Id; dst :: Id; src -> c -> dst;",
    );
    let mut names: Vec<&str> = graph.elements.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["c/in", "dst", "src"]);
    let c_in = graph.element_index("c/in").unwrap();
    assert_eq!(graph.elements[c_in].configuration, "7");
    assert_eq!(graph.elements[c_in].class_name, "Id");
    assert_eq!(
        edges(&graph),
        vec![edge("c/in", 0, "dst", 0), edge("src", 0, "c/in", 0)]
    );
}

#[test]
fn overload_dispatch_by_arity() {
    let graph = flatten(
        "elementclass C {\n\
           input -> output\n\
         ||\n\
           input -> Id -> output;\n\
           input -> [1] output;\n\
         }\n\
         x :: C; s1 :: Src; d1 :: Sink;\n\
         s1 -> x -> d1;\n\
         y :: C; s2 :: Src; d2 :: Sink; d3 :: Sink;\n\
         s2 -> y; y -> d2; y [1] -> d3;",
    );
    // x picks the pass-through body, y the two-output body
    assert_eq!(
        edges(&graph),
        vec![
            edge("s1", 0, "d1", 0),
            edge("s2", 0, "d3", 0),
            edge("s2", 0, "y/Id@1", 0),
            edge("y/Id@1", 0, "d2", 0),
        ]
    );
}

#[test]
fn free_tunnel_connects_across() {
    let graph = flatten("connectiontunnel a -> b; Src -> a; b -> Sink;");
    assert_eq!(edges(&graph), vec![edge("Src@3", 0, "Sink@4", 0)]);
}

#[test]
fn tunnel_expansion_is_confluent_across_compounds() {
    let graph = flatten(
        "elementclass P { input -> Id -> output; }\n\
         a :: P; b :: P;\n\
         Src -> a -> b -> Sink;",
    );
    assert_eq!(
        edges(&graph),
        vec![
            edge("Src@3", 0, "a/Id@1", 0),
            edge("a/Id@1", 0, "b/Id@1", 0),
            edge("b/Id@1", 0, "Sink@4", 0),
        ]
    );
}

#[test]
fn inline_anonymous_compound() {
    let graph = flatten("Src -> { input -> Id -> output } -> Sink;");
    assert_eq!(graph.elements.len(), 3);
    let by_class: Vec<&str> = graph
        .connections
        .iter()
        .flat_map(|c| {
            [
                graph.elements[c.from].class_name.as_str(),
                graph.elements[c.to].class_name.as_str(),
            ]
        })
        .collect();
    assert_eq!(by_class, vec!["Src", "Id", "Id", "Sink"]);
}

#[test]
fn nested_compounds_and_variable_scoping() {
    let graph = flatten(
        "elementclass Outer {\n\
           $a |\n\
           elementclass Inner { $b | e :: Id($a-$b); input -> e -> output; }\n\
           i :: Inner($a);\n\
           input -> i -> output;\n\
         }\n\
         o :: Outer(X); Src -> o -> Sink;",
    );
    let e = graph.element_index("o/i/e").expect("inner element");
    // $a resolves through the outer frame, $b through the inner one
    assert_eq!(graph.elements[e].configuration, "X-X");
    assert_eq!(
        edges(&graph),
        vec![
            edge("Src@2", 0, "o/i/e", 0),
            edge("o/i/e", 0, "Sink@3", 0),
        ]
    );
}

#[test]
fn compound_extension_adds_an_overload() {
    let graph = flatten(
        "elementclass C { input -> output; }\n\
         elementclass C { ... || $a | input -> Id($a) -> output; }\n\
         c :: C(5); Src -> c -> Sink;\n\
         u :: C; Src -> u -> Sink;",
    );
    let id = graph.element_index("c/Id@1").expect("expanded element");
    assert_eq!(graph.elements[id].configuration, "5");
    // u picks the argument-less base body: a straight pass-through
    assert_eq!(graph.connections.len(), 3);
    assert!(edges(&graph).contains(&edge("Src@5", 0, "Sink@6", 0)));
}

#[test]
fn duplicate_compound_signature_is_reported() {
    let err = compiler()
        .compile(
            "elementclass C { input -> output || input -> output; } c :: C; Src -> c -> Sink;",
            "test.weft",
        )
        .unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("redeclaration of 'C[0 arguments, 1 input, 1 output]'")));
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("previously declared here")));
}

#[test]
fn unknown_class_produces_error_placeholder() {
    let mut compiler = compiler();
    let mut graph = FlatGraph::new();
    let mut errh = ErrorCollector::new();
    compiler.compile_into("z :: Zap; z -> Sink;", "test.weft", &mut graph, &mut errh, None);
    assert_eq!(errh.nerrors(), 1);
    assert!(errh.diagnostics()[0]
        .message
        .contains("unknown element class 'Zap'"));
    assert_eq!(graph.elements[0].class_name, "Error");
    assert_eq!(graph.connections.len(), 1);
}

#[test]
fn synonym_classes_resolve_to_their_target() {
    let graph = flatten("elementclass Buffer Queue; b :: Buffer(8); Src -> b -> Sink;");
    let b = graph.element_index("b").unwrap();
    assert_eq!(graph.elements[b].class_name, "Queue");
    assert_eq!(graph.elements[b].configuration, "8");
}

#[test]
fn line_directives_rewrite_landmarks() {
    let graph = flatten("#line 100 \"gen.weft\"\na :: Id;\nb :: Id;\na -> b;");
    let a = graph.element_index("a").unwrap();
    let b = graph.element_index("b").unwrap();
    assert_eq!(graph.elements[a].landmark, "gen.weft:100");
    assert_eq!(graph.elements[b].landmark, "gen.weft:101");
}

#[test]
fn requirements_are_collected_and_hooked() {
    #[derive(Default)]
    struct Hook {
        words: Vec<String>,
    }
    impl LexerExtra for Hook {
        fn require(&mut self, word: &str, _errh: &mut dyn ErrorSink) {
            self.words.push(word.to_string());
        }
    }

    let mut compiler = compiler();
    let mut graph = FlatGraph::new();
    let mut errh = ErrorCollector::new();
    let mut hook = Hook::default();
    compiler.compile_into(
        "require(fastpath, checksums); a :: Id;",
        "test.weft",
        &mut graph,
        &mut errh,
        Some(&mut hook),
    );
    assert_eq!(errh.nerrors(), 0);
    assert_eq!(graph.requirements, vec!["fastpath", "checksums"]);
    assert_eq!(hook.words, vec!["fastpath", "checksums"]);
}

#[test]
fn malformed_requirement_is_reported() {
    let err = compiler()
        .compile("require(two words);", "test.weft")
        .unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("bad requirement")));
}

#[test]
fn compound_port_misuse_is_reported() {
    let err = compiler()
        .compile(
            "elementclass C { input -> output; Id -> input; } c :: C; Src -> c -> Sink;",
            "test.weft",
        )
        .unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("pseudoelement 'input' may only be used as output")));
}

#[test]
fn unmatched_ports_cause_overload_miss() {
    let err = compiler()
        .compile(
            "elementclass C { input -> output; } c :: C; Src -> c; c -> Sink; c [3] -> Sink;",
            "test.weft",
        )
        .unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("no match for 'C[0 arguments, 1 input, 4 outputs]'")));
}

#[test]
fn unfed_compound_input_is_reported() {
    // the body reads input ports 0 and 1, the call site only feeds 1
    let err = compiler()
        .compile(
            "elementclass C { input -> output; input [1] -> [1] output; }\n\
             c :: C; Src -> [1] c; c -> Sink; c [1] -> Sink;",
            "test.weft",
        )
        .unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("'c' input 0 unused")));
}

#[test]
fn print_and_reparse_round_trips() {
    let graph = flatten(
        "require(fastpath);\n\
         elementclass C { $x | q :: Queue($x, 12); input -> q -> output; }\n\
         c :: C(64); src :: Src; dst :: Sink;\n\
         src -> c -> dst;\n\
         connectiontunnel t_in -> t_out;\n\
         src [1] -> t_in; t_out -> [2] dst;",
    );
    let printed = graph.to_string();
    let reparsed = compiler()
        .compile(&printed, "printed.weft")
        .expect("printed graph must re-parse");

    let summary = |g: &FlatGraph| {
        let mut elements: Vec<(String, String, String)> = g
            .elements
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    e.class_name.clone(),
                    e.configuration.clone(),
                )
            })
            .collect();
        elements.sort();
        (elements, edges(g), g.requirements.clone())
    };
    assert_eq!(summary(&graph), summary(&reparsed));
}

#[test]
fn compiler_is_reusable_and_scopes_do_not_leak() {
    let mut compiler = compiler();
    compiler
        .compile(
            "elementclass Z { input -> Id -> output; } z :: Z; Src -> z -> Sink;",
            "first.weft",
        )
        .expect("first compile");
    // Z was scoped to the first source
    let err = compiler.compile("z :: Z;", "second.weft").unwrap_err();
    assert!(err
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unknown element class 'Z'")));
    // and the primitives are still there
    assert!(compiler.class_names().contains(&"Queue"));
}

#[test]
fn config_splitting_respects_quoting_in_args() {
    let graph = flatten("a :: Queue(\"x,y\" , 10); ");
    let a = graph.element_index("a").unwrap();
    assert_eq!(graph.elements[a].configuration, "\"x,y\" , 10");
}

#[test]
fn interpolation_escapes() {
    let graph = flatten(
        "elementclass C { $x | q :: Queue($$x $x \\$x); input -> q -> output; }\n\
         c :: C(9); Src -> c -> Sink;",
    );
    let q = graph.element_index("c/q").unwrap();
    assert_eq!(graph.elements[q].configuration, "$x 9 \\$x");
}
