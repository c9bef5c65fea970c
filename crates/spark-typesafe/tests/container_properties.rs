#![cfg(not(loom))]

//! 单线程容器的性质测试：以 `BTreeSet` 作为参照模型，随机操作序列后两者内容一致。

use std::collections::BTreeSet;

use proptest::prelude::*;
use spark_typesafe::{SSort, SkipList, THash};

#[derive(Clone, Debug)]
enum Op {
    Add(u16),
    Del(u16),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u16>().prop_map(|v| Op::Add(v % 512)),
        2 => any::<u16>().prop_map(|v| Op::Del(v % 512)),
        1 => Just(Op::Pop),
    ]
}

fn hash16(value: &u16) -> u32 {
    u32::from(*value).wrapping_mul(0x9E37_79B1)
}

proptest! {
    #[test]
    fn skiplist_matches_ordered_set(ops in proptest::collection::vec(op(), 1..200), seed in any::<u64>()) {
        let mut model = BTreeSet::new();
        let mut list = SkipList::with_seed(|a: &u16, b: &u16| a.cmp(b), seed);

        for op in ops {
            match op {
                Op::Add(v) => prop_assert_eq!(list.add(v).is_new(), model.insert(v)),
                Op::Del(v) => {
                    let removed = list.find(&v).and_then(|id| list.del(id));
                    prop_assert_eq!(removed.is_some(), model.remove(&v));
                }
                Op::Pop => prop_assert_eq!(list.pop(), model.pop_first()),
            }
        }

        let contents: Vec<u16> = list.iter().map(|(_, v)| *v).collect();
        prop_assert_eq!(contents, model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn sorted_list_matches_ordered_set(ops in proptest::collection::vec(op(), 1..120)) {
        let mut model = BTreeSet::new();
        let mut list = SSort::new(|a: &u16, b: &u16| a.cmp(b));

        for op in ops {
            match op {
                Op::Add(v) => prop_assert_eq!(list.add(v).is_new(), model.insert(v)),
                Op::Del(v) => {
                    let removed = list.find(&v).and_then(|id| list.del(id));
                    prop_assert_eq!(removed.is_some(), model.remove(&v));
                }
                Op::Pop => prop_assert_eq!(list.pop(), model.pop_first()),
            }
        }

        prop_assert_eq!(list.count(), model.len());
    }

    #[test]
    fn hash_table_keeps_membership_and_size_invariants(ops in proptest::collection::vec(op(), 1..200)) {
        let mut model = BTreeSet::new();
        let mut table = THash::new(hash16, |a: &u16, b: &u16| a.cmp(b));

        for op in ops {
            match op {
                Op::Add(v) => prop_assert_eq!(table.add(v).is_new(), model.insert(v)),
                Op::Del(v) => {
                    let removed = table.find(&v).and_then(|id| table.del(id));
                    prop_assert_eq!(removed.is_some(), model.remove(&v));
                }
                Op::Pop => {
                    if let Some(v) = table.pop() {
                        prop_assert!(model.remove(&v));
                    } else {
                        prop_assert!(model.is_empty());
                    }
                }
            }
            let size = table.tabsize();
            if size > 0 {
                prop_assert!(size.is_power_of_two());
                prop_assert!(table.count() < size, "插入后条目数必须小于桶数");
            }
        }

        prop_assert_eq!(table.count(), model.len());
        for v in &model {
            prop_assert!(table.find(v).is_some());
        }
    }
}
