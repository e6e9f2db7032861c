//! Drag-and-drop evaluation
//!
//! The engine decides whether a hovered drop is legal and where a committed
//! drop lands. It never mutates the forest itself; the state manager applies
//! the plan it returns.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tree_model::{Forest, NodeId, NodeKey, TreeNode};

use crate::config::{DragConfig, DragMode};

/// Where a dragged node lands relative to the hovered target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropPosition {
    #[display(fmt = "before")]
    Before,
    #[display(fmt = "after")]
    After,
    #[display(fmt = "inside")]
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DragPhase {
    #[default]
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "dragging")]
    Dragging,
    /// Hovering a target; `allow_drop` holds the verdict
    #[display(fmt = "evaluating")]
    Evaluating,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragState {
    pub phase: DragPhase,
    pub drag_node: Option<NodeKey>,
    pub drop_target: Option<NodeKey>,
    pub position: Option<DropPosition>,
    pub allow_drop: bool,
}

impl DragState {
    pub fn is_dragging(&self) -> bool {
        self.phase != DragPhase::Idle
    }
}

/// Why a hovered drop was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DropRejection {
    #[display(fmt = "dragging is disabled")]
    Disabled,
    #[display(fmt = "unknown node")]
    UnknownNode,
    #[display(fmt = "cannot drop a node onto itself")]
    SameNode,
    #[display(fmt = "cannot drop a node into its own subtree")]
    Descendant,
    #[display(fmt = "target does not accept drops")]
    NotDroppable,
    #[display(fmt = "sort mode only reorders siblings")]
    NotSibling,
    #[display(fmt = "sort mode does not nest nodes")]
    SortOnly,
}

/// Outcome of evaluating a hovered target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropVerdict {
    pub position: DropPosition,
    pub rejection: Option<DropRejection>,
}

impl DropVerdict {
    pub fn allow_drop(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Destination of a committed drop: the new parent (`None` for the root
/// list) and the index in that list after the dragged node is detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropPlan {
    pub parent: Option<NodeId>,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DragDropEngine {
    config: DragConfig,
}

impl DragDropEngine {
    pub fn new(config: DragConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.mode != DragMode::Disabled
    }

    pub fn can_drag(&self, node: &TreeNode) -> bool {
        self.is_enabled() && node.is_draggable()
    }

    /// Classify a vertical pointer offset within a target row of `height`.
    ///
    /// Top quarter is `Before`, bottom quarter `After`, the rest `Inside`.
    pub fn classify(offset_y: f64, height: f64) -> DropPosition {
        if height.is_nan() || height <= 0.0 {
            return DropPosition::Inside;
        }
        let ratio = offset_y / height;
        if ratio < 0.25 {
            DropPosition::Before
        } else if ratio > 0.75 {
            DropPosition::After
        } else {
            DropPosition::Inside
        }
    }

    /// Decide whether dropping `drag` at `position` relative to `target` is
    /// legal.
    pub fn evaluate(
        &self,
        forest: &Forest,
        drag: NodeId,
        target: NodeId,
        position: DropPosition,
    ) -> DropVerdict {
        let reject = |rejection| DropVerdict {
            position,
            rejection: Some(rejection),
        };

        if !self.is_enabled() {
            return reject(DropRejection::Disabled);
        }
        let (Some(drag_node), Some(target_node)) = (forest.get(drag), forest.get(target)) else {
            return reject(DropRejection::UnknownNode);
        };
        if drag == target {
            return reject(DropRejection::SameNode);
        }
        if target_node.path.len() > drag_node.path.len()
            && target_node.path.starts_with(&drag_node.path)
        {
            return reject(DropRejection::Descendant);
        }

        if self.config.mode == DragMode::Sort {
            if position == DropPosition::Inside {
                return reject(DropRejection::SortOnly);
            }
            if drag_node.parent != target_node.parent {
                return reject(DropRejection::NotSibling);
            }
            return DropVerdict {
                position,
                rejection: None,
            };
        }

        // The container the node would end up in must accept drops, unless
        // the node is only being reordered within its current parent.
        let container = match position {
            DropPosition::Inside => Some(target),
            DropPosition::Before | DropPosition::After => target_node.parent,
        };
        if let Some(container_id) = container {
            let accepts = forest.get(container_id).map(|n| n.is_droppable()).unwrap_or(false);
            let reorder = position != DropPosition::Inside && drag_node.parent == Some(container_id);
            if !accepts && !reorder {
                return reject(DropRejection::NotDroppable);
            }
        }

        DropVerdict {
            position,
            rejection: None,
        }
    }

    /// Where `drag` lands when dropped at `position` relative to `target`.
    ///
    /// Callers must have checked the drop with [`Self::evaluate`].
    pub fn plan(forest: &Forest, drag: NodeId, target: NodeId, position: DropPosition) -> Option<DropPlan> {
        let drag_node = forest.get(drag)?;
        let target_node = forest.get(target)?;

        let plan = match position {
            DropPosition::Inside => DropPlan {
                parent: Some(target),
                index: None,
            },
            DropPosition::Before | DropPosition::After => {
                let mut index = target_node.index;
                if position == DropPosition::After {
                    index += 1;
                }
                // Detaching an earlier sibling shifts the target up by one
                if drag_node.parent == target_node.parent && drag_node.index < target_node.index {
                    index -= 1;
                }
                DropPlan {
                    parent: target_node.parent,
                    index: Some(index),
                }
            }
        };
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_model::TreeNodeData;

    fn forest() -> Forest {
        Forest::from_data(&[
            TreeNodeData::new("A", "A"),
            TreeNodeData::new("B", "B")
                .child(TreeNodeData::new("B1", "B1"))
                .child(TreeNodeData::new("B2", "B2").child(TreeNodeData::new("B2a", "B2a"))),
            TreeNodeData::new("C", "C").droppable(false),
        ])
    }

    fn id(forest: &Forest, key: &str) -> NodeId {
        forest.id_of(&NodeKey::from(key)).unwrap()
    }

    fn full() -> DragDropEngine {
        DragDropEngine::new(DragConfig {
            enabled: true,
            mode: DragMode::Full,
        })
    }

    #[test]
    fn test_classify_offsets() {
        assert_eq!(DragDropEngine::classify(0.0, 32.0), DropPosition::Before);
        assert_eq!(DragDropEngine::classify(7.9, 32.0), DropPosition::Before);
        assert_eq!(DragDropEngine::classify(16.0, 32.0), DropPosition::Inside);
        assert_eq!(DragDropEngine::classify(24.0, 32.0), DropPosition::Inside);
        assert_eq!(DragDropEngine::classify(31.0, 32.0), DropPosition::After);
        assert_eq!(DragDropEngine::classify(5.0, 0.0), DropPosition::Inside);
    }

    #[test]
    fn test_disabled_config_rejects_everything() {
        let f = forest();
        let engine = DragDropEngine::default();
        let node = f.get(id(&f, "A")).unwrap();
        assert!(!engine.can_drag(node));
        let verdict = engine.evaluate(&f, id(&f, "A"), id(&f, "B"), DropPosition::Inside);
        assert_eq!(verdict.rejection, Some(DropRejection::Disabled));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let f = forest();
        let engine = full();
        let b = id(&f, "B");

        let verdict = engine.evaluate(&f, b, b, DropPosition::Inside);
        assert_eq!(verdict.rejection, Some(DropRejection::SameNode));

        let verdict = engine.evaluate(&f, b, id(&f, "B2a"), DropPosition::After);
        assert_eq!(verdict.rejection, Some(DropRejection::Descendant));
        assert!(!verdict.allow_drop());
    }

    #[test]
    fn test_full_mode_respects_droppable() {
        let f = forest();
        let engine = full();
        let b1 = id(&f, "B1");

        assert!(engine.evaluate(&f, b1, id(&f, "A"), DropPosition::Inside).allow_drop());
        assert_eq!(
            engine.evaluate(&f, b1, id(&f, "C"), DropPosition::Inside).rejection,
            Some(DropRejection::NotDroppable)
        );
        // the root list always accepts
        assert!(engine.evaluate(&f, b1, id(&f, "C"), DropPosition::Before).allow_drop());
    }

    #[test]
    fn test_sort_mode_only_reorders_siblings() {
        let f = forest();
        let engine = DragDropEngine::new(DragConfig {
            enabled: true,
            mode: DragMode::Sort,
        });
        let b1 = id(&f, "B1");

        assert!(engine.evaluate(&f, b1, id(&f, "B2"), DropPosition::After).allow_drop());
        assert_eq!(
            engine.evaluate(&f, b1, id(&f, "B2"), DropPosition::Inside).rejection,
            Some(DropRejection::SortOnly)
        );
        assert_eq!(
            engine.evaluate(&f, b1, id(&f, "A"), DropPosition::Before).rejection,
            Some(DropRejection::NotSibling)
        );
    }

    #[test]
    fn test_plan_adjusts_same_parent_index() {
        let f = forest();
        let a = id(&f, "A");
        let c = id(&f, "C");

        // A (index 0) after C (index 2): C shifts to 1 once A is detached
        let plan = DragDropEngine::plan(&f, a, c, DropPosition::After).unwrap();
        assert_eq!(plan, DropPlan { parent: None, index: Some(2) });

        let plan = DragDropEngine::plan(&f, c, a, DropPosition::Before).unwrap();
        assert_eq!(plan, DropPlan { parent: None, index: Some(0) });

        let plan = DragDropEngine::plan(&f, id(&f, "B1"), c, DropPosition::Inside).unwrap();
        assert_eq!(plan, DropPlan { parent: Some(c), index: None });
    }
}
