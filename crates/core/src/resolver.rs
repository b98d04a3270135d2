//! Dependency resolution
//!
//! Turns requested targets into a linear execution order by depth-first
//! traversal, emitting each target after all of its dependencies. Ties are
//! broken by the order in which dependencies were declared, so the result is
//! deterministic.

use std::collections::HashSet;

use crate::registry::TargetRegistry;
use crate::types::{KilnError, KilnResult};

/// Resolve `requested` (or the registry's default targets when empty) into an
/// execution order with no duplicates
pub fn resolve(registry: &TargetRegistry, requested: &[String]) -> KilnResult<Vec<String>> {
    let requested = if requested.is_empty() {
        registry.default_targets()
    } else {
        requested.to_vec()
    };

    let mut resolver = Resolver {
        registry,
        visited: HashSet::new(),
        path: Vec::new(),
        order: Vec::new(),
    };

    for name in &requested {
        let target = registry.lookup(name)?;
        resolver.visit(&target.name)?;
    }

    Ok(resolver.order)
}

struct Resolver<'a> {
    registry: &'a TargetRegistry,
    visited: HashSet<&'a str>,
    /// Targets on the current traversal path, outermost first
    path: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn visit(&mut self, name: &'a str) -> KilnResult<()> {
        if self.visited.contains(name) {
            return Ok(());
        }

        if let Some(start) = self.path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = self.path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(KilnError::CyclicDependency { cycle });
        }

        let registry = self.registry;
        let target = registry.lookup(name).map_err(|e| match e {
            KilnError::UnknownTarget { name, .. } => KilnError::UnknownTarget {
                name,
                required_by: self.path.last().map(|n| n.to_string()),
            },
            other => other,
        })?;
        self.path.push(name);
        for dep in &target.dependencies {
            self.visit(dep)?;
        }
        self.path.pop();

        self.visited.insert(name);
        self.order.push(name.to_string());
        Ok(())
    }
}
