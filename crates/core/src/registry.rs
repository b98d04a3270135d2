//! Target registry
//!
//! Holds the static mapping from target name to its dependencies and action.
//! The registry is filled once before a run and only read afterwards.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::kosaraju_scc;
use petgraph::prelude::*;

use crate::execution::context::ActionContext;
use crate::types::{ActionError, KilnError, KilnResult};

type ActionFn = dyn Fn(&ActionContext<'_>) -> Result<(), ActionError>;

/// The procedure a target runs to produce its side effects
pub struct Action(Box<ActionFn>);

impl Action {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + 'static,
    {
        Self(Box::new(f))
    }

    /// Action running each shell command in the workspace, in order.
    /// `{name}` placeholders are filled from the settings at execution time.
    pub fn shell<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        Self::new(move |ctx| {
            for command in &commands {
                let command = ctx.settings.interpolate(command)?;
                ctx.shell(&command)?;
            }
            Ok(())
        })
    }

    pub fn run(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// A named unit of work
#[derive(Debug)]
pub struct Target {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    action: Option<Action>,
}

impl Target {
    pub fn new<I, S>(name: impl Into<String>, dependencies: I, action: Action) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action: Some(action),
        }
    }

    /// Target that only groups its dependencies. It has no action and no marker.
    pub fn aggregate<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn is_aggregate(&self) -> bool {
        self.action.is_none()
    }
}

/// Declaration-ordered set of targets
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
    defaults: Vec<String>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: Target) -> KilnResult<()> {
        if self.index.contains_key(&target.name) {
            return Err(KilnError::DuplicateTarget { name: target.name });
        }
        self.index.insert(target.name.clone(), self.targets.len());
        self.targets.push(target);
        Ok(())
    }

    /// Register one of two action bodies under a single name. Only the
    /// branch picked by `condition` is ever built.
    pub fn register_variant<I, S>(
        &mut self,
        name: &str,
        dependencies: I,
        description: Option<&str>,
        condition: bool,
        when_true: impl FnOnce() -> Action,
        when_false: impl FnOnce() -> Action,
    ) -> KilnResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let action = if condition { when_true() } else { when_false() };
        let mut target = Target::new(name, dependencies, action);
        target.description = description.map(str::to_string);
        self.register(target)
    }

    pub fn lookup(&self, name: &str) -> KilnResult<&Target> {
        self.index
            .get(name)
            .map(|&i| &self.targets[i])
            .ok_or_else(|| KilnError::UnknownTarget {
                name: name.to_string(),
                required_by: None,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn set_default_targets(&mut self, defaults: Vec<String>) {
        self.defaults = defaults;
    }

    /// Targets selected when none are requested: the configured defaults, or
    /// every target in declaration order.
    pub fn default_targets(&self) -> Vec<String> {
        if self.defaults.is_empty() {
            self.names()
        } else {
            self.defaults.clone()
        }
    }

    /// Check that every dependency and default target is registered
    pub fn validate(&self) -> KilnResult<()> {
        for target in &self.targets {
            for dep in &target.dependencies {
                if !self.contains(dep) {
                    return Err(KilnError::UnknownTarget {
                        name: dep.clone(),
                        required_by: Some(target.name.clone()),
                    });
                }
            }
        }
        for name in &self.defaults {
            self.lookup(name)?;
        }
        Ok(())
    }

    /// Graph with an edge from every target to each of its dependencies.
    /// Dependencies on unregistered names are left out.
    pub fn dependency_graph(&self) -> DiGraph<String, ()> {
        let mut graph = DiGraph::<String, ()>::new();
        let nodes: Vec<NodeIndex> = self
            .targets
            .iter()
            .map(|t| graph.add_node(t.name.clone()))
            .collect();

        for (i, target) in self.targets.iter().enumerate() {
            for dep in &target.dependencies {
                if let Some(&j) = self.index.get(dep) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        graph
    }

    /// All dependency cycles, each as a sorted list of names
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let graph = self.dependency_graph();
        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
            .into_iter()
            .filter_map(|component| {
                if component.len() > 1 {
                    let mut cycle = component
                        .iter()
                        .map(|node| graph[*node].clone())
                        .collect::<Vec<_>>();
                    cycle.sort();
                    Some(cycle)
                } else {
                    let node = component[0];
                    if graph.contains_edge(node, node) {
                        Some(vec![graph[node].clone()])
                    } else {
                        None
                    }
                }
            })
            .collect();

        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Action {
        Action::new(|_| Ok(()))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TargetRegistry::new();
        registry
            .register(Target::new("a", Vec::<String>::new(), noop()))
            .unwrap();
        registry
            .register(Target::new("b", ["a"], noop()).with_description("second"))
            .unwrap();

        let b = registry.lookup("b").unwrap();
        assert_eq!(b.dependencies, vec!["a".to_string()]);
        assert_eq!(b.description.as_deref(), Some("second"));
        assert!(!b.is_aggregate());
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = TargetRegistry::new();
        registry
            .register(Target::new("a", Vec::<String>::new(), noop()))
            .unwrap();

        let err = registry.register(Target::aggregate("a", ["x"])).unwrap_err();
        assert!(matches!(err, KilnError::DuplicateTarget { ref name } if name == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_lookup_fails() {
        let registry = TargetRegistry::new();
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, KilnError::UnknownTarget { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_register_variant_builds_only_chosen_branch() {
        let mut registry = TargetRegistry::new();
        registry
            .register_variant(
                "kaldi",
                Vec::<String>::new(),
                Some("speech toolkit"),
                true,
                noop,
                || panic!("unchosen branch must not be built"),
            )
            .unwrap();

        assert!(registry.lookup("kaldi").unwrap().action().is_some());
    }

    #[test]
    fn test_default_targets() {
        let mut registry = TargetRegistry::new();
        registry
            .register(Target::new("a", Vec::<String>::new(), noop()))
            .unwrap();
        registry.register(Target::aggregate("all", ["a"])).unwrap();
        assert_eq!(registry.default_targets(), vec!["a", "all"]);

        registry.set_default_targets(vec!["all".to_string()]);
        assert_eq!(registry.default_targets(), vec!["all"]);
        registry.validate().unwrap();

        registry.set_default_targets(vec!["nope".to_string()]);
        assert!(matches!(
            registry.validate(),
            Err(KilnError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_validate_reports_undefined_dependency() {
        let mut registry = TargetRegistry::new();
        registry.register(Target::aggregate("all", ["ghost"])).unwrap();

        let err = registry.validate().unwrap_err();
        assert!(matches!(
            err,
            KilnError::UnknownTarget { ref name, required_by: Some(ref dependent) }
                if name == "ghost" && dependent == "all"
        ));
        assert_eq!(
            err.to_string(),
            "Unknown target 'ghost' (required by 'all')"
        );
    }

    #[test]
    fn test_cycles_are_reported() {
        let mut registry = TargetRegistry::new();
        registry.register(Target::new("a", ["b"], noop())).unwrap();
        registry.register(Target::new("b", ["a"], noop())).unwrap();
        registry.register(Target::new("c", ["c"], noop())).unwrap();
        registry.register(Target::new("d", ["a"], noop())).unwrap();

        assert_eq!(
            registry.cycles(),
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()]
            ]
        );
        assert_eq!(registry.dependency_graph().edge_count(), 4);
    }
}
