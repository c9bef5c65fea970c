//! 结构化日志断言。
//!
//! - **意图 (Why)**：Apply/Abort 阶段的回调错误不会改变事务结果，只体现在日志中，需要单独断言；
//! - **执行 (How)**：`#[traced_test]` 安装全局捕获订阅者，因此本文件不调用 `support::init_tracing`。

mod support;

use spark_northbound::{Client, Event};
use support::fixture;
use tracing_test::traced_test;

#[test]
#[traced_test]
fn apply_failure_is_logged_but_commit_succeeds() {
    let fx = fixture();
    fx.journal.fail_on(Event::Apply, "/ft:routing/hostname");
    let candidate = fx.candidate(&[("/ft:routing/hostname", Some("r1"))]);

    let id = fx
        .engine
        .commit(&candidate, Client::Cli, "apply-error", true)
        .expect("apply 错误不影响提交结果");
    assert!(id.is_some());
    assert_eq!(fx.engine.running().tree.get_value("/ft:routing/hostname"), Some("r1"));
    assert!(logs_contain("error processing callback"));
    assert!(logs_contain("apply callback failed"));
}

#[test]
#[traced_test]
fn dropped_transaction_logs_warning() {
    let fx = fixture();
    let candidate = fx.candidate(&[("/ft:routing/domain", Some("example.net"))]);
    let transaction = fx
        .engine
        .commit_prepare(&candidate, Client::Sysrepo, "leaked")
        .expect("准备成功");
    drop(transaction);
    assert!(logs_contain("unfinished transaction dropped, aborting"));
}

#[test]
#[traced_test]
fn debug_mode_traces_each_callback() {
    let fx = fixture();
    let candidate = fx.candidate(&[("/ft:routing/contact", Some("noc"))]);
    fx.engine
        .commit(&candidate, Client::Cli, "trace", false)
        .expect("提交成功");
    assert!(logs_contain("northbound callback"));
    assert!(logs_contain("/ft:routing/contact"));
}
