//! 结构差异性质验证。
//!
//! # 教案式说明
//! - **意图 (Why)**：变更集完全由 `DataTree::diff` 推导，差异漏报会让守护进程与运行配置失去同步；
//! - **契约 (What)**：
//!   - 性质 1：把 `a.diff(b)` 的每一项重放到 `a` 的副本上，结果与 `b` 相等；
//!   - 性质 2：树与自身的差异为空；
//!   - 性质 3：经 JSON 序列化后重建的树与原树相等；
//!   - 性质 4：把 `ChangeSet::diff` 的 Create/Modify/Delete 经 `edit`/`delete` 重放到 `a` 的副本上，
//!     逐节点的路径与取值与 `b` 一致；
//! - **执行 (How)**：以 Proptest 在示例模式上生成随机编辑序列，分别构造 `a` 与 `b`；
//! - **风险 (Trade-offs)**：恢复默认值在变更集中表现为携带默认值的 Modify，重放后该叶子是显式值
//!   (`is_default() == false`)，因此性质 4 只比较路径与取值，不比较默认标记。

mod support;

use proptest::prelude::*;
use spark_northbound::{ChangeSet, DataTree, Delta, NodeKind, NodeRegistry, Operation};

fn edit_strategy() -> impl Strategy<Value = (String, Option<String>)> {
    prop_oneof![
        "[a-c]{1,3}".prop_map(|v| ("/ft:routing/hostname".to_owned(), Some(v))),
        "[a-c]{1,3}".prop_map(|v| ("/ft:routing/contact".to_owned(), Some(v))),
        (0..3u8).prop_map(|i| (format!("/ft:routing/interface[name='eth{i}']"), None)),
        (0..3u8, prop_oneof![Just("1500"), Just("9000")])
            .prop_map(|(i, mtu)| (format!("/ft:routing/interface[name='eth{i}']/mtu"), Some(mtu.to_owned()))),
        (0..3u8, "[a-c]{1,2}")
            .prop_map(|(i, text)| (format!("/ft:routing/interface[name='eth{i}']/description"), Some(text))),
        (0..2u8).prop_map(|i| (format!("/ft:routing/interface[name='eth{i}']/shutdown"), None)),
        "[x-z]".prop_map(|tag| ("/ft:routing/tag".to_owned(), Some(tag))),
        "[0-9]".prop_map(|area| ("/ft:routing/router/area".to_owned(), Some(area))),
        prop_oneof![Just("30"), Just("60")]
            .prop_map(|timer| ("/ft:routing/router/timer".to_owned(), Some(timer.to_owned()))),
    ]
}

fn build(edits: &[(String, Option<String>)]) -> DataTree {
    let mut tree = DataTree::new(support::schema());
    for (path, value) in edits {
        tree.edit(path, value.as_deref()).expect("生成的编辑总是合法");
    }
    tree
}

fn replay(base: &DataTree, deltas: &[Delta]) -> DataTree {
    let mut tree = base.clone();
    for delta in deltas {
        match delta {
            Delta::Created(node) => tree.graft(node).expect("父节点已存在"),
            Delta::Deleted(node) => tree.delete(node.path()).expect("被删除的节点存在"),
            Delta::Changed { new, .. } if new.is_default() => tree.delete(new.path()).expect("恢复默认值"),
            Delta::Changed { new, .. } => tree.edit(new.path(), new.value()).expect("更新取值"),
            Delta::Moved(_) => {}
        }
    }
    tree
}

/// 按回调语义重放变更集：Create/Modify 写入节点取值，Delete 删除节点。
fn replay_changes(base: &DataTree, target: &DataTree) -> DataTree {
    let schema = support::schema();
    let registry = NodeRegistry::build(schema.as_ref(), &[support::MODULE]).expect("构建成功");
    let changes = ChangeSet::diff(&registry, base, target).expect("差异可计算");
    let mut tree = base.clone();
    for change in changes.iter() {
        match change.operation {
            Operation::Create | Operation::Modify => {
                tree.edit(change.path(), change.node.value()).expect("写入变更");
            }
            Operation::Delete => tree.delete(change.path()).expect("被删除的节点存在"),
            _ => {}
        }
    }
    tree
}

/// 除非存在性容器外每个节点的路径与取值，排序后比较。
fn values(tree: &DataTree) -> Vec<(String, Option<String>)> {
    let schema = tree.schema();
    let mut values: Vec<_> = tree
        .iter()
        .filter(|node| {
            !schema
                .node(node.schema_path())
                .is_some_and(|snode| matches!(snode.kind, NodeKind::Container { presence: false }))
        })
        .map(|node| (node.path().to_owned(), node.value().map(str::to_owned)))
        .collect();
    values.sort();
    values
}

#[test]
fn reset_to_default_replays_as_explicit_value() {
    let mtu = "/ft:routing/interface[name='eth0']/mtu";
    let running = build(&[(mtu.to_owned(), Some("9000".to_owned()))]);
    let mut candidate = running.clone();
    candidate.delete(mtu).expect("恢复默认值");
    assert!(candidate.find(mtu).is_some_and(|node| node.is_default()));

    let schema = support::schema();
    let registry = NodeRegistry::build(schema.as_ref(), &[support::MODULE]).expect("构建成功");
    let changes = ChangeSet::diff(&registry, &running, &candidate).expect("差异可计算");
    let emitted: Vec<_> = changes
        .iter()
        .map(|change| (change.operation, change.path().to_owned(), change.node.value().map(str::to_owned)))
        .collect();
    assert_eq!(emitted, vec![(Operation::Modify, mtu.to_owned(), Some("1500".to_owned()))]);

    let replayed = replay_changes(&running, &candidate);
    assert_eq!(values(&replayed), values(&candidate));
    assert!(
        replayed.find(mtu).is_some_and(|node| !node.is_default()),
        "重放得到的是显式写入的默认值"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_replayed_diff_reaches_target(
        a in prop::collection::vec(edit_strategy(), 0..12),
        b in prop::collection::vec(edit_strategy(), 0..12),
    ) {
        let old = build(&a);
        let new = build(&b);
        let deltas = old.diff(&new);
        prop_assert_eq!(replay(&old, &deltas), new);
    }

    #[test]
    fn prop_tree_has_no_diff_with_itself(edits in prop::collection::vec(edit_strategy(), 0..12)) {
        let tree = build(&edits);
        prop_assert!(tree.diff(&tree.clone()).is_empty());
        prop_assert!(tree.diff(&build(&edits)).is_empty(), "同一编辑序列构造的树结构相同");
    }

    #[test]
    fn prop_json_round_trip_preserves_tree(edits in prop::collection::vec(edit_strategy(), 1..12)) {
        let tree = build(&edits);
        let json = tree.to_json().expect("序列化成功");
        let restored = DataTree::from_json(support::schema(), &json).expect("重建成功");
        prop_assert_eq!(restored, tree);
    }

    #[test]
    fn prop_replayed_changeset_reaches_target(
        a in prop::collection::vec(edit_strategy(), 0..12),
        b in prop::collection::vec(edit_strategy(), 0..12),
    ) {
        let running = build(&a);
        let candidate = build(&b);
        let replayed = replay_changes(&running, &candidate);
        prop_assert_eq!(values(&replayed), values(&candidate));
    }
}
