//! Boundary-port resolution between fragment scopes.
//!
//! Independently authored fragments (sensor, actuator, kinematics) are
//! connected by plain port links that may cross fragment boundaries.
//! [`FragmentGraph::correct_links`] rewrites every such link so that each
//! in-port references a source visible in its own scope:
//!
//! - source inside a nested fragment → exposed through boundary out-ports
//!   (`provide_out_port`, cached per source);
//! - source outside the fragment → forwarded through a synthesized boundary
//!   in-port named `node:port` (cached per source).
//!
//! Links whose source is not reachable from the fragment at all are reported
//! as unresolved.

use crate::error::FragmentError;

use super::graph::{FragmentGraph, NodeId, NodeKind, PortDirection, PortId};

impl FragmentGraph {
    /// Expose `source` (an out-port anywhere below `fragment`, or one of its
    /// nested boundary in-ports) as a boundary out-port of `fragment`.
    ///
    /// Repeated calls for the same source return the same port; `name` is
    /// only used when the port is first created. Intermediate fragments get
    /// boundary ports named `node:port`. On error no port is left behind.
    pub fn provide_out_port(
        &mut self,
        fragment: NodeId,
        source: PortId,
        name: &str,
    ) -> Result<PortId, FragmentError> {
        let mark = self.ports.len();
        let provided = self.expose_source(fragment, source, name);
        if provided.is_err() {
            self.discard_ports_from(mark);
        }
        provided
    }

    fn expose_source(
        &mut self,
        fragment: NodeId,
        source: PortId,
        name: &str,
    ) -> Result<PortId, FragmentError> {
        if !self.node(fragment).is_fragment() {
            return Err(FragmentError::NotAFragment(self.path(fragment)));
        }
        if !self.is_source(source) {
            return Err(FragmentError::NotASource(self.port_path(source)));
        }
        let not_in_scope = || FragmentError::NotInScope {
            fragment: self.path(fragment),
            port: self.port_path(source),
        };
        let scope = self
            .source_scope(source)
            .filter(|s| self.is_within(*s, fragment))
            .ok_or_else(not_in_scope)?;

        let inner = if scope == fragment {
            source
        } else {
            let child = self.child_towards(fragment, scope).ok_or_else(not_in_scope)?;
            let qualified = self.qualified_name(source);
            self.expose_source(child, source, &qualified)?
        };

        if let NodeKind::Fragment { provided, .. } = &self.node(fragment).kind {
            if let Some(existing) = provided.get(&inner) {
                return Ok(*existing);
            }
        }

        let ty = self.port(inner).ty;
        let port = self.new_port(fragment, name, PortDirection::Out, ty, Some(inner))?;
        if let NodeKind::Fragment { provided, .. } = &mut self.nodes[fragment.0].kind {
            provided.insert(inner, port);
        }
        Ok(port)
    }

    /// Recursively repair cross-scope links below `fragment`.
    ///
    /// # Errors
    ///
    /// Returns `FragmentError::Unresolved` naming every in-port whose source
    /// could not be brought into scope. All resolvable links are still
    /// repaired.
    pub fn correct_links(&mut self, fragment: NodeId) -> Result<(), FragmentError> {
        if !self.node(fragment).is_fragment() {
            return Err(FragmentError::NotAFragment(self.path(fragment)));
        }
        let mut unresolved = Vec::new();
        self.correct_scope(fragment, &mut unresolved);
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(FragmentError::Unresolved(unresolved))
        }
    }

    fn correct_scope(&mut self, fragment: NodeId, unresolved: &mut Vec<String>) {
        let children = self.children(fragment).to_vec();
        for child in children {
            if self.node(child).is_fragment() {
                self.correct_scope(child, unresolved);
            }
            let inputs = self.node(child).in_ports.clone();
            for input in inputs {
                let Some(source) = self.port(input).link else {
                    continue;
                };
                match self.bring_into_scope(fragment, source) {
                    Some(scoped) => self.ports[input.0].link = Some(scoped),
                    None => unresolved.push(self.port_path(input)),
                }
            }
        }
    }

    /// A source equivalent to `source` that is visible inside `scope`.
    ///
    /// Either every boundary port on the way is created or none is.
    fn bring_into_scope(&mut self, scope: NodeId, source: PortId) -> Option<PortId> {
        let mark = self.ports.len();
        let scoped = self.import_source(scope, source);
        if scoped.is_none() {
            self.discard_ports_from(mark);
        }
        scoped
    }

    fn import_source(&mut self, scope: NodeId, source: PortId) -> Option<PortId> {
        let visible = self.source_scope(source);
        if visible == Some(scope) {
            return Some(source);
        }
        if let Some(v) = visible.filter(|v| self.is_within(*v, scope)) {
            let child = self.child_towards(scope, v)?;
            let name = self.qualified_name(source);
            return self.expose_source(child, source, &name).ok();
        }

        // Source lies outside `scope`: forward it through a boundary in-port.
        if let Some(existing) = self.imported_port(scope, source) {
            return Some(existing);
        }
        let parent = self.node(scope).parent?;
        let outer = self.import_source(parent, source)?;
        let name = self.unique_port_name(scope, &self.qualified_name(source));
        let ty = self.port(source).ty;
        let port = self
            .new_port(scope, &name, PortDirection::In, ty, Some(outer))
            .ok()?;
        if let NodeKind::Fragment { imported, .. } = &mut self.nodes[scope.0].kind {
            imported.insert(source, port);
        }
        Some(port)
    }

    fn imported_port(&self, fragment: NodeId, source: PortId) -> Option<PortId> {
        if let NodeKind::Fragment { imported, .. } = &self.node(fragment).kind {
            if let Some(port) = imported.get(&source) {
                return Some(*port);
            }
        }
        // A boundary in-port declared by hand that already forwards `source`.
        self.node(fragment)
            .in_ports
            .iter()
            .copied()
            .find(|p| self.port(*p).link == Some(source))
    }

    fn unique_port_name(&self, node: NodeId, base: &str) -> String {
        let taken = |name: &str| {
            let n = self.node(node);
            n.in_ports
                .iter()
                .chain(n.out_ports.iter())
                .any(|p| self.port(*p).name == name)
        };
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|i| format!("{base}#{i}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// In-ports below `fragment` whose source is not visible in their scope.
    ///
    /// Empty means the fragment compiles. Does not modify the graph.
    pub fn unresolved(&self, fragment: NodeId) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_unresolved(fragment, &mut out);
        out
    }

    fn collect_unresolved(&self, fragment: NodeId, out: &mut Vec<String>) {
        for child in self.children(fragment) {
            if self.node(*child).is_fragment() {
                self.collect_unresolved(*child, out);
            }
            for input in self.node(*child).in_ports() {
                if let Some(source) = self.port(*input).link {
                    if self.source_scope(source) != self.consumer_scope(*input) {
                        out.push(self.port_path(*input));
                    }
                }
            }
        }
    }
}
