#![cfg(loom)]

use loom::{model, sync::Arc, thread};
use spark_typesafe::{AtomLink, AtomLinked, AtomList};

struct Slot {
    link: AtomLink,
    id: u8,
}

impl AtomLinked for Slot {
    fn atom_link(&self) -> &AtomLink {
        &self.link
    }
}

fn leak(id: u8) -> &'static Slot {
    Box::leak(Box::new(Slot {
        link: AtomLink::new(),
        id,
    }))
}

#[test]
fn concurrent_head_and_tail_insertions_are_linearizable() {
    //
    // 教案级说明：一个线程头插、一个线程尾插，另一个条目已在链中。
    // - **Why**：头插 CAS 与尾插"走到链尾再 CAS"可能交错，需要确认不会丢失条目；
    // - **What**：所有交错下最终遍历都恰好包含三个条目，且预置条目位于头插与尾插之间。
    model(|| {
        let list: Arc<AtomList<'static, Slot>> = Arc::new(AtomList::new());
        list.add_head(leak(0));

        let head = {
            let list = Arc::clone(&list);
            thread::spawn(move || list.add_head(leak(1)))
        };
        let tail = {
            let list = Arc::clone(&list);
            thread::spawn(move || list.add_tail(leak(2)))
        };

        head.join().expect("头插线程不应 panic");
        tail.join().expect("尾插线程不应 panic");

        let ids: Vec<u8> = list.iter().map(|slot| slot.id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    });
}

#[test]
fn concurrent_pops_never_share_an_item() {
    model(|| {
        let list: Arc<AtomList<'static, Slot>> = Arc::new(AtomList::new());
        list.add_tail(leak(0));
        list.add_tail(leak(1));

        let spawn_pop = || {
            let list = Arc::clone(&list);
            thread::spawn(move || list.pop().map(|slot| slot.id))
        };
        let first = spawn_pop();
        let second = spawn_pop();

        let a = first.join().expect("弹出线程不应 panic");
        let b = second.join().expect("弹出线程不应 panic");
        assert_ne!(a, b, "两个线程不能拿到同一个条目");
        assert!(list.is_empty());
    });
}
