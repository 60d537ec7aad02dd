//! Policy rule tree reconstruction and execution (C3).
//!
//! Policies are persisted as flat `PolicyRuleRow`s with `left_child`/
//! `right_child` id pointers (§3, §9). This module rebuilds the tree(s) for
//! one policy and walks them against a merged attribute bundle.

use std::collections::{HashMap, HashSet};

use authz_shared::{AttributeValue, Policy, PolicyRuleNode, PolicyRuleRow, RuleOperator};

use crate::attributes;

/// The subject/resource/environment attribute values relevant to one
/// `Check`, merged into a single lookup by `definition_id` (§4.3/§4.4).
#[derive(Debug, Clone, Default)]
pub struct AttributeBundle {
    by_definition_id: HashMap<i64, String>,
}

impl AttributeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge subject, resource, and environment values into one bundle,
    /// keyed by `definition_id`. Later kinds never need to win over earlier
    /// ones here — each `AttributeValue` is already scoped to one entity
    /// kind and a definition belongs to exactly one kind (§3).
    pub fn from_values(values: impl IntoIterator<Item = AttributeValue>) -> Self {
        let mut bundle = Self::new();
        for value in values {
            bundle.by_definition_id.insert(value.definition_id, value.value);
        }
        bundle
    }

    pub fn insert(&mut self, definition_id: i64, value: String) {
        self.by_definition_id.insert(definition_id, value);
    }

    /// Merges another bundle's entries in. Used to combine the subject,
    /// resource, and environment bundles of one `Check` into the single
    /// lookup `evaluate_node` walks (§4.9).
    pub fn extend(&mut self, other: AttributeBundle) {
        self.by_definition_id.extend(other.by_definition_id);
    }

    pub fn get(&self, definition_id: i64) -> Option<&str> {
        self.by_definition_id.get(&definition_id).map(|s| s.as_str())
    }
}

/// Reconstructs the forest of rule trees persisted as flat rows for one
/// policy. Roots are rows whose id is nobody else's child (§9); each
/// subtree is built by recursive lookup with a visited guard so a
/// misconfigured cyclic graph cannot hang evaluation (§3 invariant, §9).
pub fn build_rule_trees(rows: &[PolicyRuleRow]) -> Vec<PolicyRuleNode> {
    let by_id: HashMap<i64, &PolicyRuleRow> = rows.iter().map(|r| (r.id, r)).collect();

    let mut child_ids: HashSet<i64> = HashSet::new();
    for row in rows {
        if let Some(left) = row.left_child {
            child_ids.insert(left);
        }
        if let Some(right) = row.right_child {
            child_ids.insert(right);
        }
    }

    let mut roots: Vec<i64> = rows
        .iter()
        .map(|r| r.id)
        .filter(|id| !child_ids.contains(id))
        .collect();
    roots.sort_unstable();

    roots
        .into_iter()
        .filter_map(|id| build_node(id, &by_id, &mut HashSet::new()))
        .collect()
}

fn build_node(
    id: i64,
    by_id: &HashMap<i64, &PolicyRuleRow>,
    visited: &mut HashSet<i64>,
) -> Option<PolicyRuleNode> {
    if !visited.insert(id) {
        // Cycle in supposedly-acyclic data; stop rather than loop (§9).
        return None;
    }

    let row = by_id.get(&id)?;

    if row.is_leaf() {
        return Some(PolicyRuleNode::Leaf {
            attr_def_id: row.attr_def_id?,
            operator: row.operator,
            value: row.value.clone().unwrap_or_default(),
        });
    }

    let left = row
        .left_child
        .and_then(|id| build_node(id, by_id, visited))
        .map(Box::new);
    let right = row
        .right_child
        .and_then(|id| build_node(id, by_id, visited))
        .map(Box::new);

    Some(PolicyRuleNode::Internal {
        operator: row.operator,
        left,
        right,
    })
}

/// Evaluates one reconstructed rule tree against the merged attribute
/// bundle and the definitions (needed to know each leaf's data type).
///
/// Leaves with a missing attribute evaluate to `false` (§4.3); evaluator
/// errors on a leaf are swallowed to `false` rather than propagated, since
/// misconfigured policy data must never crash a decision.
pub fn evaluate_node(
    node: &PolicyRuleNode,
    bundle: &AttributeBundle,
    data_type_of: &HashMap<i64, authz_shared::DataType>,
) -> bool {
    match node {
        PolicyRuleNode::Leaf {
            attr_def_id,
            operator,
            value,
        } => {
            let Some(actual) = bundle.get(*attr_def_id) else {
                return false;
            };
            let Some(data_type) = data_type_of.get(attr_def_id).copied() else {
                return false;
            };
            attributes::evaluate(data_type, *operator, value, actual).unwrap_or(false)
        }
        PolicyRuleNode::Internal { operator, left, right } => match operator {
            RuleOperator::And => {
                let l = left.as_deref().map(|n| evaluate_node(n, bundle, data_type_of)).unwrap_or(false);
                let r = right.as_deref().map(|n| evaluate_node(n, bundle, data_type_of)).unwrap_or(false);
                l && r
            }
            RuleOperator::Or => {
                let l = left.as_deref().map(|n| evaluate_node(n, bundle, data_type_of)).unwrap_or(false);
                let r = right.as_deref().map(|n| evaluate_node(n, bundle, data_type_of)).unwrap_or(false);
                l || r
            }
            RuleOperator::Not => {
                // NOT uses only the right child (§3 invariant).
                !right.as_deref().map(|n| evaluate_node(n, bundle, data_type_of)).unwrap_or(false)
            }
            // An internal node with a comparison operator is malformed data; fail closed.
            _ => false,
        },
    }
}

/// Evaluates every top-level rule tree of `policy` against `rows`/`bundle`.
/// A policy is satisfied iff *all* top-level trees evaluate true (§4.3:
/// top-level rules are conjunctive).
pub fn evaluate_policy(
    rows: &[PolicyRuleRow],
    bundle: &AttributeBundle,
    data_type_of: &HashMap<i64, authz_shared::DataType>,
) -> bool {
    let trees = build_rule_trees(rows);
    if trees.is_empty() {
        return false;
    }
    trees.iter().all(|tree| evaluate_node(tree, bundle, data_type_of))
}

/// Convenience wrapper bundling a `Policy` with the rows of its own rule
/// trees, as the hybrid pipeline (C9) consumes it: one fetch of policies,
/// one batched fetch of all their rows, matched back up by `policy_id`.
pub struct PolicyWithRules<'a> {
    pub policy: &'a Policy,
    pub rows: Vec<PolicyRuleRow>,
}

pub fn group_rows_by_policy<'a>(policies: &'a [Policy], rows: Vec<PolicyRuleRow>) -> Vec<PolicyWithRules<'a>> {
    let mut by_policy: HashMap<i64, Vec<PolicyRuleRow>> = HashMap::new();
    for row in rows {
        by_policy.entry(row.policy_id).or_default().push(row);
    }

    policies
        .iter()
        .map(|policy| PolicyWithRules {
            policy,
            rows: by_policy.remove(&policy.id).unwrap_or_default(),
        })
        .collect()
}
