use loom_core::Agent;
use std::collections::HashMap;
use std::sync::Arc;

/// Depth-first search for the agent named `target_name` in the tree rooted
/// at `root`.
pub fn find_agent(root: &Arc<dyn Agent>, target_name: &str) -> Option<Arc<dyn Agent>> {
    if root.name() == target_name {
        return Some(root.clone());
    }
    for sub_agent in root.sub_agents() {
        if let Some(found) = find_agent(sub_agent, target_name) {
            return Some(found);
        }
    }
    None
}

/// Maps every non-root agent name to its parent's name.
pub fn build_parent_map(root: &Arc<dyn Agent>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    fn walk(agent: &Arc<dyn Agent>, map: &mut HashMap<String, String>) {
        for child in agent.sub_agents() {
            map.insert(child.name().to_string(), agent.name().to_string());
            walk(child, map);
        }
    }
    walk(root, &mut map);
    map
}

/// Walks the tree depth-first, returning the first duplicate name
/// encountered (including the root) or `None` if every name is unique.
pub fn validate_unique_names(root: &Arc<dyn Agent>) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    fn walk(agent: &Arc<dyn Agent>, seen: &mut std::collections::HashSet<String>) -> Option<String> {
        if !seen.insert(agent.name().to_string()) {
            return Some(agent.name().to_string());
        }
        for child in agent.sub_agents() {
            if let Some(dup) = walk(child, seen) {
                return Some(dup);
            }
        }
        None
    }
    walk(root, &mut seen)
}
