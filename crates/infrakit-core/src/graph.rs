//! Dependency ordering shared by stage and stack graphs.

use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Order `nodes` so every node comes after its dependencies.
///
/// `needs` maps a node to the nodes it depends on. Nodes are visited in the
/// order given, so an already valid order is returned unchanged. Dependencies
/// that are not in `nodes` are ignored; callers validate references first.
/// On a cycle the error names the edge that closes it, e.g. `"a -> b"`.
pub fn topological_order<'a>(
    nodes: &[&'a str],
    needs: &HashMap<&'a str, Vec<&'a str>>,
) -> Result<Vec<&'a str>, String> {
    let known: HashSet<&str> = nodes.iter().copied().collect();
    let mut marks: HashMap<&'a str, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(nodes.len());

    for node in nodes {
        if !marks.contains_key(node) {
            visit(*node, needs, &known, &mut marks, &mut order)?;
        }
    }

    Ok(order)
}

fn visit<'a>(
    node: &'a str,
    needs: &HashMap<&'a str, Vec<&'a str>>,
    known: &HashSet<&str>,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<&'a str>,
) -> Result<(), String> {
    marks.insert(node, Mark::InProgress);

    for dep in needs.get(node).into_iter().flatten() {
        if !known.contains(dep) {
            continue;
        }
        match marks.get(dep) {
            Some(Mark::InProgress) => return Err(format!("{} -> {}", node, dep)),
            Some(Mark::Done) => {}
            None => visit(*dep, needs, known, marks, order)?,
        }
    }

    marks.insert(node, Mark::Done);
    order.push(node);
    Ok(())
}
