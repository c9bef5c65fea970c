//! 两棵数据树之间的结构差异。

use std::sync::Arc;

use super::DataNode;
use crate::schema::{SchemaNode, SchemaProvider};

/// 单条结构差异。
///
/// - `Created`/`Changed::new`/`Moved` 持有新树中的节点，`Deleted`/`Changed::old` 持有旧树中的节点；
/// - 共享同一 `Arc` 的子树视为未变化，直接跳过。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    Created(Arc<DataNode>),
    Deleted(Arc<DataNode>),
    Changed { old: Arc<DataNode>, new: Arc<DataNode> },
    /// 用户排序列表或叶子列表中条目的相对位置发生变化。
    Moved(Arc<DataNode>),
}

impl Delta {
    /// 差异所描述的节点（变化类取新值）。
    pub fn node(&self) -> &Arc<DataNode> {
        match self {
            Delta::Created(node) | Delta::Deleted(node) | Delta::Moved(node) => node,
            Delta::Changed { new, .. } => new,
        }
    }
}

pub(super) fn diff_siblings(
    schema: &dyn SchemaProvider,
    old: &[Arc<DataNode>],
    new: &[Arc<DataNode>],
    out: &mut Vec<Delta>,
) {
    for before in old {
        if !new.iter().any(|after| after.segment == before.segment) {
            out.push(Delta::Deleted(Arc::clone(before)));
        }
    }

    for after in new {
        let Some(before) = old.iter().find(|before| before.segment == after.segment) else {
            out.push(Delta::Created(Arc::clone(after)));
            continue;
        };
        if Arc::ptr_eq(before, after) {
            continue;
        }
        if before.value != after.value || before.is_default != after.is_default {
            out.push(Delta::Changed {
                old: Arc::clone(before),
                new: Arc::clone(after),
            });
        }
        diff_siblings(schema, &before.children, &after.children, out);
    }

    detect_moves(schema, old, new, out);
}

/// 对每个用户排序的模式节点，比较新旧树中共同条目的相对顺序。
fn detect_moves(
    schema: &dyn SchemaProvider,
    old: &[Arc<DataNode>],
    new: &[Arc<DataNode>],
    out: &mut Vec<Delta>,
) {
    let mut seen: Vec<&str> = Vec::new();
    for after in new {
        let schema_path = after.schema_path.as_str();
        if seen.contains(&schema_path) {
            continue;
        }
        seen.push(schema_path);
        if !schema
            .node(schema_path)
            .is_some_and(SchemaNode::is_user_ordered)
        {
            continue;
        }

        let common_old: Vec<&Arc<DataNode>> = old
            .iter()
            .filter(|before| {
                before.schema_path == schema_path
                    && new.iter().any(|candidate| candidate.segment == before.segment)
            })
            .collect();
        let common_new: Vec<&Arc<DataNode>> = new
            .iter()
            .filter(|candidate| {
                candidate.schema_path == schema_path
                    && old.iter().any(|before| before.segment == candidate.segment)
            })
            .collect();

        for (index, moved) in common_new.iter().enumerate() {
            if common_old[index].segment != moved.segment {
                out.push(Delta::Moved(Arc::clone(moved)));
            }
        }
    }
}
