//! Router output interface and the built-in flat-graph receiver.

use std::fmt;

use serde::Serialize;

use super::ElementClass;

/// Receiver for the flattened graph. The compiler emits every non-tunnel
/// element, every resolved connection, and the accumulated requirements
/// through this interface.
pub trait Router {
    /// Add one element; returns its index in the receiver.
    fn add_element(
        &mut self,
        class: Box<dyn ElementClass>,
        name: &str,
        configuration: &str,
        landmark: &str,
    ) -> usize;

    fn add_connection(&mut self, from: usize, from_port: usize, to: usize, to_port: usize);

    fn add_requirement(&mut self, requirement: &str);
}

/// One emitted element.
#[derive(Debug, Serialize)]
pub struct ElementRecord {
    pub name: String,
    pub class_name: String,
    pub configuration: String,
    pub landmark: String,
    #[serde(skip_serializing)]
    pub class: Box<dyn ElementClass>,
}

/// One emitted connection, from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: usize,
    pub from_port: usize,
    pub to: usize,
    pub to_port: usize,
}

/// The default router: plain records, printable back as Weft source.
#[derive(Debug, Default, Serialize)]
pub struct FlatGraph {
    pub elements: Vec<ElementRecord>,
    pub connections: Vec<Connection>,
    pub requirements: Vec<String>,
}

impl FlatGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element_index(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name == name)
    }
}

impl Router for FlatGraph {
    fn add_element(
        &mut self,
        class: Box<dyn ElementClass>,
        name: &str,
        configuration: &str,
        landmark: &str,
    ) -> usize {
        let idx = self.elements.len();
        self.elements.push(ElementRecord {
            name: name.to_string(),
            class_name: class.class_name().to_string(),
            configuration: configuration.to_string(),
            landmark: landmark.to_string(),
            class,
        });
        idx
    }

    fn add_connection(&mut self, from: usize, from_port: usize, to: usize, to_port: usize) {
        self.connections.push(Connection {
            from,
            from_port,
            to,
            to_port,
        });
    }

    fn add_requirement(&mut self, requirement: &str) {
        self.requirements.push(requirement.to_string());
    }
}

impl fmt::Display for FlatGraph {
    /// Prints the graph in Weft syntax. Re-parsing the output with the
    /// same primitive classes yields the same flat graph.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for requirement in &self.requirements {
            writeln!(f, "require({requirement});")?;
        }
        for element in &self.elements {
            if element.configuration.is_empty() {
                writeln!(f, "{} :: {};", element.name, element.class_name)?;
            } else {
                writeln!(
                    f,
                    "{} :: {}({});",
                    element.name, element.class_name, element.configuration
                )?;
            }
        }
        for c in &self.connections {
            writeln!(
                f,
                "{} [{}] -> [{}] {};",
                self.elements[c.from].name, c.from_port, c.to_port, self.elements[c.to].name
            )?;
        }
        Ok(())
    }
}
