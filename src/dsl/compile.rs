//! Compound expansion and graph emission: the back half of the
//! pipeline. A single left-to-right scan over the scope's elements
//! splices compound bodies in (following elements appended along the
//! way, so nested compounds resolve in one pass), then tunnels are
//! resolved and the flat graph is handed to the router.

use std::collections::HashSet;

use log::debug;

use crate::graph::compound::signature;
use crate::graph::registry::{ClassId, Overload, ERROR_CLASS, TUNNEL_CLASS};
use crate::graph::router::Router;
use crate::graph::tunnel::ExpandState;
use crate::graph::Port;

use super::config::split_args;
use super::error::ContextSink;
use super::parser::Parser;
use super::variables::VariableEnvironment;

impl Parser<'_, '_, '_, '_> {
    /// Expand every compound-typed element, then emit elements,
    /// connections, and requirements into `router`.
    pub(crate) fn into_router(mut self, router: &mut dyn Router) {
        let mut environment_map: Vec<usize> = vec![0; self.builder.nelements()];
        let mut environments = vec![VariableEnvironment::new()];

        let mut i = 0;
        while i < self.builder.nelements() {
            let class = self.builder.classes[i];
            if class != TUNNEL_CLASS {
                if let Some(compound) = self.registry.resolve_compound(class) {
                    self.expand_compound_element(
                        i,
                        compound,
                        &mut environment_map,
                        &mut environments,
                    );
                }
            }
            i += 1;
        }

        // tunnels vanish; everything else becomes a router element
        let mut router_id: Vec<Option<usize>> = Vec::with_capacity(self.builder.nelements());
        for i in 0..self.builder.nelements() {
            if self.builder.classes[i] != TUNNEL_CLASS {
                let instance = self.registry.instantiate(self.builder.classes[i]);
                let e = router.add_element(
                    instance,
                    &self.builder.names[i],
                    &self.builder.configs[i],
                    &self.builder.landmarks[i],
                );
                router_id.push(Some(e));
            } else {
                router_id.push(None);
            }
        }

        let mut emitted = HashSet::new();
        for c in 0..self.builder.conn_from.len() {
            let hf = self.builder.conn_from[c];
            let ht = self.builder.conn_to[c];
            match (router_id[hf.elem], router_id[ht.elem]) {
                (Some(from), Some(to)) => router.add_connection(from, hf.port, to, ht.port),
                _ => self.add_router_connections(c, &router_id, &mut emitted, router),
            }
        }

        for requirement in &self.requirements {
            router.add_requirement(requirement);
        }
    }

    /// Select the right overload for the compound-typed element at
    /// `which` and splice its body in. A chain that resolves to a
    /// non-compound record just retypes the element; a miss marks it as
    /// an error and lists the candidates.
    fn expand_compound_element(
        &mut self,
        which: usize,
        compound_id: ClassId,
        environment_map: &mut Vec<usize>,
        environments: &mut Vec<VariableEnvironment>,
    ) {
        let old_nelements = self.builder.nelements();
        let args = split_args(&self.builder.configs[which]);

        let mut inputs_used = 0;
        let mut outputs_used = 0;
        for i in 0..self.builder.conn_from.len() {
            let hf = self.builder.conn_from[i];
            let ht = self.builder.conn_to[i];
            if ht.elem == which && ht.port >= inputs_used {
                inputs_used = ht.port + 1;
            }
            if hf.elem == which && hf.port >= outputs_used {
                outputs_used = hf.port + 1;
            }
        }

        debug!(
            "expanding '{}': {} args, {} inputs, {} outputs",
            self.builder.names[which],
            args.len(),
            inputs_used,
            outputs_used
        );

        let found = match self
            .registry
            .find_relevant_class(compound_id, inputs_used, outputs_used, args.len())
        {
            Overload::Miss => {
                let (name, landmark) = match self.registry.compound(compound_id) {
                    Some(compound) => (
                        compound.name().to_string(),
                        compound.landmark().to_string(),
                    ),
                    None => return,
                };
                self.errh.error(
                    &landmark,
                    &format!(
                        "no match for '{}'",
                        signature(&name, inputs_used, outputs_used, args.len())
                    ),
                );
                let mut ctx = ContextSink::new(&mut *self.errh, "possibilities are:");
                self.registry.report_signatures(compound_id, &mut ctx);
                self.builder.classes[which] = ERROR_CLASS;
                return;
            }
            Overload::Fallback(id) => {
                self.builder.classes[which] = id;
                return;
            }
            Overload::Body(id) => id,
        };

        let compound = match self.registry.compound(found) {
            Some(compound) => compound.clone(),
            None => return,
        };

        // pick or derive the variable environment for the new elements
        let mut vei = environment_map[which];
        if args.is_empty() && compound.depth() == 0 {
            vei = 0;
        } else if !args.is_empty() || environments[vei].depth() >= compound.depth() {
            let mut ve = VariableEnvironment::new();
            if vei > 0 {
                ve.enter(&environments[vei]);
            }
            ve.limit_depth(compound.depth());
            ve.enter_frame(compound.formals(), &args, compound.depth());
            environments.push(ve);
            vei = environments.len() - 1;
        }

        compound.expand_into(self, which, &environments[vei]);

        // new elements inherit the environment
        for _ in old_nelements..self.builder.nelements() {
            environment_map.push(vei);
        }
    }

    /// Emit the cross product of the non-tunnel endpoints both sides of
    /// connection `c` expand to. Edges reached through more than one
    /// tunnel-crossing record are emitted once.
    fn add_router_connections(
        &mut self,
        c: usize,
        router_id: &[Option<usize>],
        emitted: &mut HashSet<(usize, usize, usize, usize)>,
        router: &mut dyn Router,
    ) {
        let mut hfrom = Vec::new();
        self.expand_connection(self.builder.conn_from[c], true, &mut hfrom);
        let mut hto = Vec::new();
        self.expand_connection(self.builder.conn_to[c], false, &mut hto);
        for f in &hfrom {
            let Some(from) = router_id[f.elem] else {
                continue;
            };
            for t in &hto {
                let Some(to) = router_id[t.elem] else {
                    continue;
                };
                if emitted.insert((from, f.port, to, t.port)) {
                    router.add_connection(from, f.port, to, t.port);
                }
            }
        }
    }

    /// Connections whose `this_end`-side port equals `this_end`,
    /// reported as their opposite-side ports.
    fn find_connections(&self, this_end: Port, is_out: bool) -> Vec<Port> {
        let (hookup_this, hookup_that) = if is_out {
            (&self.builder.conn_from, &self.builder.conn_to)
        } else {
            (&self.builder.conn_to, &self.builder.conn_from)
        };
        hookup_this
            .iter()
            .zip(hookup_that)
            .filter(|(this, _)| **this == this_end)
            .map(|(_, that)| *that)
            .collect()
    }

    /// Flatten one connection endpoint: a non-tunnel port is itself; a
    /// tunnel port expands through its end. A port found only on the
    /// opposite-direction list is being used the wrong way round.
    pub(crate) fn expand_connection(&mut self, this_end: Port, is_out: bool, into: &mut Vec<Port>) {
        if self.builder.classes[this_end.elem] != TUNNEL_CLASS {
            into.push(this_end);
            return;
        }
        if let Some(end) = self.builder.tunnels.find(is_out, this_end) {
            self.expand_tunnel_end(end, into);
        } else if self.builder.tunnels.find(!is_out, this_end).is_some() {
            let name = self.builder.names[this_end.elem].clone();
            let landmark = self.builder.landmarks[this_end.elem].clone();
            let message = if is_out {
                format!("'{name}' used as output")
            } else {
                format!("'{name}' used as input")
            };
            self.errh.error(&landmark, &message);
        }
    }

    /// Resolve a tunnel end to the non-tunnel ports reachable through
    /// its paired side, with three-state memoisation. Re-entering an end
    /// mid-expansion (a cycle through tunnels) contributes nothing.
    fn expand_tunnel_end(&mut self, end: usize, into: &mut Vec<Port>) {
        match self.builder.tunnels.end(end).state {
            ExpandState::Expanding => {}
            ExpandState::Done => {
                into.extend_from_slice(&self.builder.tunnels.end(end).resolved);
            }
            ExpandState::Fresh => {
                self.builder.tunnels.end_mut(end).state = ExpandState::Expanding;
                let (other_port, is_output) = {
                    let e = self.builder.tunnels.end(end);
                    (self.builder.tunnels.end(e.other).port, e.is_output)
                };

                let connections = self.find_connections(other_port, !is_output);
                if connections.is_empty() {
                    self.report_unused_tunnel(end, other_port, is_output);
                }

                let mut resolved = Vec::new();
                for connection in connections {
                    self.expand_connection(connection, is_output, &mut resolved);
                }
                into.extend_from_slice(&resolved);
                let e = self.builder.tunnels.end_mut(end);
                e.resolved = resolved;
                e.state = ExpandState::Done;
            }
        }
    }

    /// A tunnel end that resolves to nothing gets a targeted report:
    /// the unused or missing port of a compound face, or the unused side
    /// of a free-standing tunnel.
    fn report_unused_tunnel(&mut self, end: usize, other_port: Port, is_output: bool) {
        let port = self.builder.tunnels.end(end).port;
        let (inh, outh) = if is_output {
            (other_port, port)
        } else {
            (port, other_port)
        };
        let in_name = self.builder.names[inh.elem].clone();
        let out_name = self.builder.names[outh.elem].clone();

        if format!("{in_name}/input") == out_name {
            let message = if is_output {
                format!("'{in_name}' input {} unused", inh.port)
            } else {
                format!("'{in_name}' has no input {}", inh.port)
            };
            let landmark = self.builder.landmarks[inh.elem].clone();
            self.errh.error(&landmark, &message);
        } else if in_name == format!("{out_name}/output") {
            let message = if is_output {
                format!("'{out_name}' has no output {}", outh.port)
            } else {
                format!("'{out_name}' output {} unused", outh.port)
            };
            let landmark = self.builder.landmarks[outh.elem].clone();
            self.errh.error(&landmark, &message);
        } else {
            let landmark = self.builder.landmarks[other_port.elem].clone();
            let side = if is_output { "input" } else { "output" };
            self.errh.error(
                &landmark,
                &format!(
                    "tunnel '{in_name} -> {out_name}' {side} {} unused",
                    port.port
                ),
            );
        }
    }
}
