//! Cross-context paths and their cardinality.
//!
//! A rule evaluated on context `C` may reference another context `T` by
//! name. Whether that reference yields one instance or many depends on how
//! `T` is reached from `C`: walking up to the nearest common ancestor costs
//! nothing, walking down through a multiple-valued navigation makes the
//! result a collection.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{TypeError, TypeResult};
use crate::model::{Cardinality, ProjectModel};

/// A path of context definition names starting at the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextPath(Vec<String>);

impl ContextPath {
    /// Path over the given names.
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Names from the root to the last context.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The context the path leads to.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A route from a context to a referenced context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossContextPath {
    path: Vec<String>,
    cardinality: Cardinality,
}

impl CrossContextPath {
    /// Create a path.
    pub fn new(path: Vec<String>, cardinality: Cardinality) -> Self {
        Self { path, cardinality }
    }

    /// Context names from the referencing context to the referenced one.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether the route passes a multiple-valued navigation.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
}

/// Cardinality of a cross-context reference over every path that leads to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCardinality {
    /// Every path yields one instance
    Single,
    /// Every path yields a collection
    Multiple,
    /// Paths disagree
    SingleOrMultiple,
}

impl ReferenceCardinality {
    /// Fold path cardinalities; `None` when there are no paths.
    pub fn aggregate(cardinalities: impl IntoIterator<Item = Cardinality>) -> Option<Self> {
        cardinalities.into_iter().fold(None, |acc, next| {
            let next = match next {
                Cardinality::Single => Self::Single,
                Cardinality::Multiple => Self::Multiple,
            };
            Some(match acc {
                None => next,
                Some(current) if current == next => current,
                Some(_) => Self::SingleOrMultiple,
            })
        })
    }
}

/// Path queries the scope builder depends on.
pub trait CrossContextPathResolver: Send + Sync {
    /// Every path from the root to `context`.
    fn paths_for(&self, context: &str) -> Vec<ContextPath>;

    /// Whether `context` is reachable from the root.
    fn has_path_to(&self, context: &str) -> bool;

    /// Routes from the last context of `from` to `to`.
    fn resolve_paths(&self, from: &ContextPath, to: &str) -> Vec<CrossContextPath>;
}

/// Navigation graph of a project built with `petgraph`.
///
/// Edges are child navigations, inherited ones included; navigations marked
/// forbid-reference are left out.
#[derive(Debug)]
pub struct NavigationGraph {
    graph: DiGraph<String, Cardinality>,
    index_map: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl NavigationGraph {
    /// Build the graph for a project.
    ///
    /// Returns an error if the root or a navigation target does not exist.
    pub fn from_model(model: &ProjectModel) -> TypeResult<Self> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for definition in &model.contexts {
            let idx = graph.add_node(definition.name.clone());
            index_map.insert(definition.name.clone(), idx);
        }

        let root = *index_map
            .get(&model.root)
            .ok_or_else(|| TypeError::MissingRoot {
                root: model.root.clone(),
            })?;

        for definition in &model.contexts {
            let Some(projection) = model.projection(&definition.name) else {
                continue;
            };
            let from_idx = index_map[&definition.name];
            for child in projection.children.iter().filter(|c| !c.forbid_reference) {
                let to_idx = index_map
                    .get(&child.target)
                    .ok_or_else(|| TypeError::unknown_context(&child.target))?;
                graph.add_edge(from_idx, *to_idx, child.cardinality);
            }
        }

        Ok(Self {
            graph,
            index_map,
            root,
        })
    }

    /// Root context name.
    pub fn root(&self) -> &str {
        &self.graph[self.root]
    }

    /// Simple downward paths from `from` to `to` with their cardinality.
    fn downward_paths(&self, from: NodeIndex, to: NodeIndex) -> Vec<(Vec<NodeIndex>, Cardinality)> {
        fn walk(
            graph: &DiGraph<String, Cardinality>,
            node: NodeIndex,
            to: NodeIndex,
            path: &mut Vec<NodeIndex>,
            multiple: bool,
            out: &mut Vec<(Vec<NodeIndex>, Cardinality)>,
        ) {
            if node == to {
                let cardinality = if multiple {
                    Cardinality::Multiple
                } else {
                    Cardinality::Single
                };
                out.push((path.clone(), cardinality));
                return;
            }
            for edge in graph.edges(node) {
                let next = edge.target();
                if path.contains(&next) {
                    continue;
                }
                path.push(next);
                let step_multiple = *edge.weight() == Cardinality::Multiple;
                walk(graph, next, to, path, multiple || step_multiple, out);
                path.pop();
            }
        }

        let mut out = Vec::new();
        let mut path = vec![from];
        walk(&self.graph, from, to, &mut path, false, &mut out);
        out
    }

    fn names(&self, nodes: &[NodeIndex]) -> Vec<String> {
        nodes.iter().map(|idx| self.graph[*idx].clone()).collect()
    }
}

impl CrossContextPathResolver for NavigationGraph {
    fn paths_for(&self, context: &str) -> Vec<ContextPath> {
        let Some(&target) = self.index_map.get(context) else {
            return Vec::new();
        };
        self.downward_paths(self.root, target)
            .into_iter()
            .map(|(nodes, _)| ContextPath(self.names(&nodes)))
            .collect()
    }

    fn has_path_to(&self, context: &str) -> bool {
        self.index_map
            .get(context)
            .is_some_and(|&idx| algo::has_path_connecting(&self.graph, self.root, idx, None))
    }

    fn resolve_paths(&self, from: &ContextPath, to: &str) -> Vec<CrossContextPath> {
        let Some(&target) = self.index_map.get(to) else {
            return Vec::new();
        };
        let segments = from.segments();
        for position in (0..segments.len()).rev() {
            let Some(&ancestor) = self.index_map.get(&segments[position]) else {
                continue;
            };
            let upward: Vec<String> = segments[position..].iter().rev().cloned().collect();
            if ancestor == target {
                return vec![CrossContextPath::new(upward, Cardinality::Single)];
            }
            let downward = self.downward_paths(ancestor, target);
            if downward.is_empty() {
                continue;
            }
            return downward
                .into_iter()
                .map(|(nodes, cardinality)| {
                    let mut path = upward.clone();
                    path.extend(self.names(&nodes[1..]));
                    CrossContextPath::new(path, cardinality)
                })
                .collect();
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildNavigation, ContextDefinition};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn model() -> ProjectModel {
        ProjectModel::new("demo", "ns", "Policy")
            .context(
                ContextDefinition::new("Policy")
                    .child(ChildNavigation::multiple("RiskItem"))
                    .child(ChildNavigation::single("Insured"))
                    .child(ChildNavigation::single("Billing").forbid_reference()),
            )
            .context(ContextDefinition::new("RiskItem").child(ChildNavigation::multiple("Coverage")))
            .context(ContextDefinition::new("Insured").child(ChildNavigation::single("Coverage")))
            .context(ContextDefinition::new("Coverage"))
            .context(ContextDefinition::new("Billing"))
            .context(ContextDefinition::new("Orphan"))
    }

    #[test]
    fn paths_for_lists_every_route_from_root() {
        let graph = NavigationGraph::from_model(&model()).unwrap();
        let mut paths: Vec<String> = graph
            .paths_for("Coverage")
            .iter()
            .map(ToString::to_string)
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["Policy.Insured.Coverage", "Policy.RiskItem.Coverage"]
        );
        assert_eq!(graph.paths_for("Policy"), vec![ContextPath::new(["Policy"])]);
    }

    #[rstest]
    #[case("Policy", true)]
    #[case("Coverage", true)]
    #[case("Billing", false)]
    #[case("Orphan", false)]
    #[case("Nope", false)]
    fn reachability(#[case] context: &str, #[case] expected: bool) {
        let graph = NavigationGraph::from_model(&model()).unwrap();
        assert_eq!(graph.has_path_to(context), expected);
    }

    #[test]
    fn nearest_ancestor_is_chosen() {
        let graph = NavigationGraph::from_model(&model()).unwrap();
        let from = ContextPath::new(["Policy", "RiskItem"]);

        let paths = graph.resolve_paths(&from, "Coverage");
        assert_eq!(
            paths,
            vec![CrossContextPath::new(
                vec!["RiskItem".into(), "Coverage".into()],
                Cardinality::Multiple
            )]
        );

        let paths = graph.resolve_paths(&from, "Insured");
        assert_eq!(
            paths,
            vec![CrossContextPath::new(
                vec!["RiskItem".into(), "Policy".into(), "Insured".into()],
                Cardinality::Single
            )]
        );

        let paths = graph.resolve_paths(&from, "Policy");
        assert_eq!(paths[0].cardinality(), Cardinality::Single);
    }

    #[test]
    fn missing_root_is_fatal() {
        let model = ProjectModel::new("demo", "ns", "Missing").context(ContextDefinition::new("A"));
        let err = NavigationGraph::from_model(&model).unwrap_err();
        assert_eq!(err.code(), "TYPE:MISSING_ROOT");
    }

    #[rstest]
    #[case(&[], None)]
    #[case(&[Cardinality::Single, Cardinality::Single], Some(ReferenceCardinality::Single))]
    #[case(&[Cardinality::Multiple], Some(ReferenceCardinality::Multiple))]
    #[case(
        &[Cardinality::Single, Cardinality::Multiple],
        Some(ReferenceCardinality::SingleOrMultiple)
    )]
    fn aggregation(#[case] input: &[Cardinality], #[case] expected: Option<ReferenceCardinality>) {
        assert_eq!(ReferenceCardinality::aggregate(input.iter().copied()), expected);
    }
}
