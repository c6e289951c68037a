//! Dependency ordering.
//!
//! Produces a load order in which every plugin appears after all of its
//! known dependencies.  Independent plugins are ordered by ascending
//! priority, then by discovery position, so the result is deterministic.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use conduit_core::{CycleError, MissingDependencyWarning};

use crate::plugin::{PluginDescriptor, PluginState};

/// Output of [`DependencyResolver::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Every descriptor, dependencies first.
    pub order: Vec<String>,
    /// `order` grouped by depth: layer `n` only depends on layers `< n`.
    /// Plugins within one layer are independent of each other.
    pub layers: Vec<Vec<String>>,
    /// Dependencies naming plugins that were never discovered.
    pub warnings: Vec<MissingDependencyWarning>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

struct Walk<'a> {
    names: &'a [String],
    edges: &'a [Vec<usize>],
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl Walk<'_> {
    fn visit(&mut self, node: usize) -> Result<(), CycleError> {
        match self.marks[node] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = self.path.iter().position(|&p| p == node).unwrap_or(0);
                let mut path: Vec<String> = self.path[start..]
                    .iter()
                    .map(|&p| self.names[p].clone())
                    .collect();
                path.push(self.names[node].clone());
                return Err(CycleError { path });
            }
            Mark::Unvisited => {}
        }

        self.marks[node] = Mark::Visiting;
        self.path.push(node);
        let edges = self.edges;
        for &dep in &edges[node] {
            self.visit(dep)?;
        }
        self.path.pop();
        self.marks[node] = Mark::Done;
        self.order.push(node);
        Ok(())
    }
}

/// Orders plugins so dependencies come first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves `descriptors` (in discovery order) into a load order.
    ///
    /// Missing dependencies are not fatal: they are attached to the dependent
    /// as warnings and skipped.  On success every descriptor's `dependents`
    /// set is rebuilt from scratch, ignoring unloaded plugins.  On a cycle
    /// the descriptors are left untouched.
    pub fn resolve(&self, descriptors: &mut [PluginDescriptor]) -> Result<Resolution, CycleError> {
        let names: Vec<String> = descriptors.iter().map(|d| d.name().to_string()).collect();
        let index: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let rank: Vec<(i32, usize)> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.priority(), i))
            .collect();

        let mut edges = vec![Vec::new(); descriptors.len()];
        let mut missing = vec![Vec::new(); descriptors.len()];
        for (i, descriptor) in descriptors.iter().enumerate() {
            for dep in descriptor.dependencies() {
                match index.get(dep.as_str()) {
                    Some(&j) => edges[i].push(j),
                    None => missing[i].push(MissingDependencyWarning {
                        plugin: names[i].clone(),
                        dependency: dep.clone(),
                    }),
                }
            }
            edges[i].sort_by_key(|&j| rank[j]);
        }

        let mut roots: Vec<usize> = (0..descriptors.len()).collect();
        roots.sort_by_key(|&i| rank[i]);

        let mut walk = Walk {
            names: &names,
            edges: &edges,
            marks: vec![Mark::Unvisited; descriptors.len()],
            path: Vec::new(),
            order: Vec::with_capacity(descriptors.len()),
        };
        for root in roots {
            walk.visit(root)?;
        }
        let order = walk.order;

        let mut depth = vec![0_usize; descriptors.len()];
        let mut layers: Vec<Vec<String>> = Vec::new();
        for &i in &order {
            depth[i] = edges[i].iter().map(|&j| depth[j] + 1).max().unwrap_or(0);
            if layers.len() <= depth[i] {
                layers.resize_with(depth[i] + 1, Vec::new);
            }
            layers[depth[i]].push(names[i].clone());
        }

        for descriptor in descriptors.iter_mut() {
            descriptor.dependents_mut().clear();
        }
        let mut warnings = Vec::new();
        for (i, found) in missing.into_iter().enumerate() {
            for w in &found {
                warn!(plugin = %w.plugin, dependency = %w.dependency, "Missing plugin dependency");
            }
            warnings.extend(found.iter().cloned());
            descriptors[i].set_warnings(found);

            if descriptors[i].state() == PluginState::Unloaded {
                continue;
            }
            for &j in &edges[i] {
                descriptors[j].dependents_mut().insert(names[i].clone());
            }
        }

        let order: Vec<String> = order.into_iter().map(|i| names[i].clone()).collect();
        debug!(order = ?order, layers = layers.len(), "Plugin dependencies resolved");
        Ok(Resolution {
            order,
            layers,
            warnings,
        })
    }
}
