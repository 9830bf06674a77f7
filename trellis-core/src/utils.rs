//! Utility functions for the container
//!
//! Naming helpers for default bean names and dependency-graph analysis used
//! by the resolver and by startup validation.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// This is the default bean naming strategy: `OrderServiceImpl` becomes
    /// `orderServiceImpl`.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("MemberServiceImpl"), "memberServiceImpl");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Strips the module path (and generic arguments) from a type name.
    ///
    /// ```
    /// use trellis_core::utils::naming::short_type_name;
    ///
    /// assert_eq!(short_type_name("hello_core::order::OrderServiceImpl"), "OrderServiceImpl");
    /// assert_eq!(short_type_name("alloc::vec::Vec<core::option::Option<u8>>"), "Vec");
    /// assert_eq!(short_type_name("NetworkClient"), "NetworkClient");
    /// ```
    pub fn short_type_name(type_name: &str) -> &str {
        let without_generics = match type_name.find('<') {
            Some(idx) => &type_name[..idx],
            None => type_name,
        };
        without_generics
            .rsplit("::")
            .next()
            .unwrap_or(without_generics)
    }
}

/// Dependency resolution utilities
pub mod dependency {
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::thread::{self, ThreadId};

    /// Tracks the beans each thread is currently constructing, in order.
    ///
    /// Every construction on a thread is registered here, whatever its
    /// scope. It catches cycles that re-enter the container through a fresh
    /// resolution, e.g. an `ObjectProvider` used inside a construction recipe,
    /// which a per-resolution stack cannot see.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<HashMap<ThreadId, Vec<String>>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks a bean as being created by the current thread.
        ///
        /// Returns `false` if it was already in this thread's chain (circular dependency).
        pub fn start_creating(&self, name: &str) -> bool {
            let mut creating = self.creating.lock();
            let chain = creating.entry(thread::current().id()).or_default();
            if chain.iter().any(|n| n == name) {
                return false;
            }
            chain.push(name.to_string());
            true
        }

        /// Marks a bean as finished being created by the current thread.
        pub fn finish_creating(&self, name: &str) {
            let mut creating = self.creating.lock();
            let id = thread::current().id();
            if let Some(chain) = creating.get_mut(&id) {
                if let Some(pos) = chain.iter().rposition(|n| n == name) {
                    chain.remove(pos);
                }
                if chain.is_empty() {
                    creating.remove(&id);
                }
            }
        }

        /// The cycle closed by `name` on the current thread: the chain from
        /// its first occurrence, followed by `name` again.
        pub fn cycle_through(&self, name: &str) -> Vec<String> {
            let creating = self.creating.lock();
            let chain = creating
                .get(&thread::current().id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let start = chain.iter().position(|n| n == name).unwrap_or(chain.len());
            let mut cycle = chain[start..].to_vec();
            cycle.push(name.to_string());
            cycle
        }
    }

    /// Dependency graph analysis result
    #[derive(Debug)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Missing dependency detected
        MissingDependency {
            /// The bean that requires the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on '{}' which is not registered", bean, missing)
                }
            }
        }
    }

    /// Validates a dependency graph for circular dependencies and missing beans.
    ///
    /// `order` fixes the traversal order so that the reported cycle is
    /// deterministic; nodes missing from `order` are visited afterwards.
    pub fn validate_dependency_graph(
        order: &[String],
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<(), DependencyValidationError> {
        for bean_name in order {
            if let Some(deps) = dependencies.get(bean_name) {
                if let Some(missing) = deps.iter().find(|dep| !dependencies.contains_key(*dep)) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: bean_name.clone(),
                        missing: missing.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        let remaining = dependencies.keys().filter(|k| !order.contains(k));
        for bean_name in order.iter().chain(remaining) {
            if !visited.contains(bean_name) {
                if let Some(cycle) =
                    detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack)
                {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    /// DFS-based cycle detection
    ///
    /// Returns Some(cycle) if a cycle is detected, None otherwise
    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(start_idx) = rec_stack.iter().position(|x| x == dep) {
                    let mut cycle = rec_stack[start_idx..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }
}
