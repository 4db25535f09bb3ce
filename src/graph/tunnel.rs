//! Tunnel endpoints: paired markers where a connection crosses a
//! compound boundary or a `connectiontunnel` declaration. They are
//! resolved away during flattening.

use super::Port;

/// Expansion progress of one tunnel end.
///
/// `Expanding` doubles as the cycle guard: re-entering an end that is
/// already being expanded contributes no ports, so pathological tunnel
/// loops terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandState {
    Fresh,
    Expanding,
    Done,
}

/// One side of a tunnel pairing.
#[derive(Debug, Clone)]
pub struct TunnelEnd {
    pub port: Port,
    pub is_output: bool,
    /// Index of the paired end on the opposite list.
    pub other: usize,
    /// Next end on the same list.
    pub next: Option<usize>,
    pub state: ExpandState,
    /// Non-tunnel ports this end resolves to, once `state` is `Done`.
    pub resolved: Vec<Port>,
}

/// Scope-local arena of tunnel ends, threaded into an input list and an
/// output list. Ends are index-linked so pairings across the two lists
/// need no shared ownership.
#[derive(Debug, Clone, Default)]
pub struct Tunnels {
    ends: Vec<TunnelEnd>,
    input_head: Option<usize>,
    output_head: Option<usize>,
}

impl Tunnels {
    pub fn end(&self, idx: usize) -> &TunnelEnd {
        &self.ends[idx]
    }

    pub fn end_mut(&mut self, idx: usize) -> &mut TunnelEnd {
        &mut self.ends[idx]
    }

    /// Create a paired input/output tunnel end at the heads of the two
    /// lists.
    pub fn add_pair(&mut self, input: Port, output: Port) {
        let in_idx = self.ends.len();
        let out_idx = in_idx + 1;
        self.ends.push(TunnelEnd {
            port: input,
            is_output: false,
            other: out_idx,
            next: self.input_head,
            state: ExpandState::Fresh,
            resolved: Vec::new(),
        });
        self.ends.push(TunnelEnd {
            port: output,
            is_output: true,
            other: in_idx,
            next: self.output_head,
            state: ExpandState::Fresh,
            resolved: Vec::new(),
        });
        self.input_head = Some(in_idx);
        self.output_head = Some(out_idx);
    }

    /// Find the end for `port` on the given side.
    ///
    /// A miss where some end references the same element (a "parent")
    /// materialises a fresh pair at this port number on both sides: a
    /// tunnel may be used at ports its declaration never mentioned, such
    /// as a compound face whose `input[3]` is wired even though the body
    /// only declares `input[0]`.
    pub fn find(&mut self, is_output: bool, port: Port) -> Option<usize> {
        let mut cur = if is_output {
            self.output_head
        } else {
            self.input_head
        };
        let mut parent = None;
        while let Some(i) = cur {
            if self.ends[i].port == port {
                return Some(i);
            }
            if self.ends[i].port.elem == port.elem {
                parent = Some(i);
            }
            cur = self.ends[i].next;
        }

        let parent = parent?;
        let parent_other = self.ends[parent].other;
        let other_port = Port::new(self.ends[parent_other].port.elem, port.port);
        let me = self.ends.len();
        let peer = me + 1;
        self.ends.push(TunnelEnd {
            port,
            is_output,
            other: peer,
            next: self.ends[parent].next,
            state: ExpandState::Fresh,
            resolved: Vec::new(),
        });
        self.ends.push(TunnelEnd {
            port: other_port,
            is_output: !is_output,
            other: me,
            next: self.ends[parent_other].next,
            state: ExpandState::Fresh,
            resolved: Vec::new(),
        });
        self.ends[parent].next = Some(me);
        self.ends[parent_other].next = Some(peer);
        Some(me)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup() {
        let mut tunnels = Tunnels::default();
        tunnels.add_pair(Port::new(0, 0), Port::new(1, 0));
        let end = tunnels.find(false, Port::new(0, 0)).unwrap();
        assert!(!tunnels.end(end).is_output);
        assert_eq!(tunnels.end(tunnels.end(end).other).port, Port::new(1, 0));
        assert!(tunnels.find(false, Port::new(2, 0)).is_none());
    }

    #[test]
    fn lazy_port_allocation() {
        let mut tunnels = Tunnels::default();
        tunnels.add_pair(Port::new(0, 0), Port::new(1, 0));
        let end = tunnels.find(false, Port::new(0, 3)).unwrap();
        assert_eq!(tunnels.end(end).port, Port::new(0, 3));
        let peer = tunnels.end(end).other;
        assert_eq!(tunnels.end(peer).port, Port::new(1, 3));
        assert!(tunnels.end(peer).is_output);
        // the fresh pair is discoverable from both lists
        assert_eq!(tunnels.find(true, Port::new(1, 3)), Some(peer));
    }
}
