//! Confirmation session lifecycle against a recording host.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{FakeHost, wait_until};
use rector_lens::core::scratch::ScratchSpace;
use rector_lens::core::session::{
    ConfirmationController, DiscardOrigin, Notice, SessionOutcome, SessionState, ViewEvent,
};
use tempfile::TempDir;

const DIFF: &str = "--- Original\n+++ New\n@@ -1,2 +1,2 @@\n <?php\n-$a = 1;\n+$a = 2;\n";

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    host: Arc<FakeHost>,
    controller: ConfirmationController<FakeHost>,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let host = Arc::new(FakeHost::default());
    let controller = ConfirmationController::with_settle_delay(
        Arc::clone(&host),
        ScratchSpace::new(Some(&root)),
        Duration::from_millis(20),
    );
    Fixture { _tmp: tmp, root, host, controller }
}

fn php(
    root: &Path,
    name: &str,
) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, "<?php\n$a = 1;\n").unwrap();
    path
}

async fn presenting(controller: &ConfirmationController<FakeHost>) {
    wait_until(|| controller.state() == SessionState::Presenting).await;
}

#[tokio::test]
async fn apply_runs_callback_once_and_cleans_up() {
    let fx = fixture();
    let file = php(&fx.root, "A.php");
    let calls = AtomicUsize::new(0);

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }),
        async {
            presenting(&fx.controller).await;
            let scratch = fx.controller.scratch_path().unwrap();
            assert_eq!(std::fs::read_to_string(&scratch).unwrap(), "<?php\n$a = 2;\n");
            assert!(fx.host.with(|s| s.choices_visible));

            assert!(fx.controller.apply());
            // second apply while the first is in flight
            assert!(!fx.controller.apply());
            assert!(!fx.controller.discard());
            assert_eq!(fx.controller.state(), SessionState::Applying);
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Applied);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.controller.state(), SessionState::Idle);
    assert!(!fx.root.join(".rector-tmp/A.rector.tmp.php").exists());
    assert!(!fx.host.with(|s| s.choices_visible));
    assert_eq!(fx.host.notices(), vec![Notice::Applied { file: file.clone() }]);
}

#[tokio::test]
async fn explicit_discard_notifies_normally() {
    let fx = fixture();
    let file = php(&fx.root, "B.php");
    let called = AtomicUsize::new(0);

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async {
            called.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        async {
            presenting(&fx.controller).await;
            assert!(fx.controller.discard());
            assert!(!fx.controller.apply());
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Discarded(DiscardOrigin::Explicit));
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert!(!fx.root.join(".rector-tmp/B.rector.tmp.php").exists());
    assert_eq!(fx.host.notices(), vec![Notice::Discarded { file: file.clone() }]);
    // original untouched
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "<?php\n$a = 1;\n");
}

#[tokio::test]
async fn closing_both_documents_discards_with_close_notice() {
    let fx = fixture();
    let file = php(&fx.root, "C.php");

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        async {
            presenting(&fx.controller).await;
            for doc in fx.host.close_all() {
                fx.controller.view_event(ViewEvent::DocumentClosed(doc));
            }
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Discarded(DiscardOrigin::ViewClosed));
    assert!(!fx.root.join(".rector-tmp/C.rector.tmp.php").exists());
    let notices = fx.host.notices();
    assert_eq!(notices, vec![Notice::DiscardedOnClose { file }]);
    assert!(!notices.iter().any(|n| matches!(n, Notice::Discarded { .. })));
}

#[tokio::test]
async fn losing_visibility_discards_after_settle() {
    let fx = fixture();
    let file = php(&fx.root, "D.php");

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        async {
            presenting(&fx.controller).await;
            fx.host.hide_all();
            fx.controller.view_event(ViewEvent::VisibleEditorsChanged);
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Discarded(DiscardOrigin::ViewClosed));
}

#[tokio::test]
async fn focus_churn_while_visible_keeps_session() {
    let fx = fixture();
    let file = php(&fx.root, "E.php");

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        async {
            presenting(&fx.controller).await;
            for _ in 0..3 {
                fx.controller.view_event(ViewEvent::VisibleEditorsChanged);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(fx.controller.state(), SessionState::Presenting);
            assert!(fx.controller.apply());
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Applied);
}

#[tokio::test]
async fn new_session_tears_down_previous_first() {
    let fx = fixture();
    let first = php(&fx.root, "First.php");
    let second = php(&fx.root, "Second.php");
    let first_scratch = fx.root.join(".rector-tmp/First.rector.tmp.php");

    let (first_outcome, second_outcome) = tokio::join!(
        fx.controller.show_diff(&first, DIFF, || async { Ok(()) }),
        async {
            presenting(&fx.controller).await;
            assert!(first_scratch.exists());
            fx.host.with(|s| s.watch_missing = vec![first_scratch.clone()]);

            let (second_outcome, _) = tokio::join!(
                fx.controller.show_diff(&second, DIFF, || async { Ok(()) }),
                async {
                    wait_until(|| fx.host.with(|s| s.comparisons.len() == 2)).await;
                    presenting(&fx.controller).await;
                    assert!(fx.controller.discard());
                }
            );
            second_outcome
        }
    );

    assert_eq!(first_outcome.unwrap(), SessionOutcome::Superseded);
    assert_eq!(second_outcome.unwrap(), SessionOutcome::Discarded(DiscardOrigin::Explicit));
    // the first artifact was gone by the time the second view opened
    assert_eq!(fx.host.with(|s| s.missing_at_open.clone()), vec![true, true]);
    assert!(!first_scratch.exists());
}

#[tokio::test]
async fn overlapping_sessions_for_one_file_leave_the_newest_live() {
    let fx = fixture();
    let file = php(&fx.root, "Same.php");
    let scratch = fx.root.join(".rector-tmp/Same.rector.tmp.php");

    let (older, newer, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        async {
            wait_until(|| fx.host.with(|s| s.comparisons.len() == 2)).await;
            presenting(&fx.controller).await;
            assert!(scratch.exists());
            assert_eq!(fx.controller.scratch_path(), Some(scratch.clone()));
            assert!(fx.controller.apply());
        }
    );

    assert_eq!(older.unwrap(), SessionOutcome::Superseded);
    assert_eq!(newer.unwrap(), SessionOutcome::Applied);
    assert_eq!(fx.controller.state(), SessionState::Idle);
    assert!(!scratch.exists());
}

#[tokio::test]
async fn abandoned_show_diff_cleans_up() {
    let fx = fixture();
    let file = php(&fx.root, "I.php");
    let scratch = fx.root.join(".rector-tmp/I.rector.tmp.php");

    tokio::select! {
        _ = fx.controller.show_diff(&file, DIFF, || async { Ok(()) }) => {
            panic!("session ended without a decision");
        }
        _ = async {
            presenting(&fx.controller).await;
            assert!(scratch.exists());
        } => {}
    }

    assert_eq!(fx.controller.state(), SessionState::Idle);
    assert!(!scratch.exists());
    assert!(!fx.host.with(|s| s.choices_visible));
    // a late decision has nothing to act on
    assert!(!fx.controller.apply());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "<?php\n$a = 1;\n");
}

#[tokio::test]
async fn unreconstructable_diff_creates_nothing() {
    let fx = fixture();
    let file = php(&fx.root, "F.php");
    let stale = "@@ -1,2 +1,2 @@\n <?php\n-$b = 1;\n+$b = 2;\n";

    let outcome = fx
        .controller
        .show_diff(&file, stale, || async { Ok(()) })
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Unreconstructable);
    assert!(!fx.root.join(".rector-tmp").exists());
    assert!(fx.host.with(|s| s.comparisons.is_empty()));
    assert_eq!(fx.host.notices(), vec![Notice::ReconstructionFailed { file }]);
}

#[tokio::test]
async fn failed_apply_is_returned_after_cleanup() {
    let fx = fixture();
    let file = php(&fx.root, "G.php");

    let (outcome, _) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { anyhow::bail!("rector exploded") }),
        async {
            presenting(&fx.controller).await;
            assert!(fx.controller.apply());
        }
    );

    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("rector exploded"));
    assert_eq!(fx.controller.state(), SessionState::Idle);
    assert!(!fx.root.join(".rector-tmp/G.rector.tmp.php").exists());
    assert!(!fx.host.with(|s| s.choices_visible));
    assert!(fx.host.notices().is_empty());
}

#[tokio::test]
async fn dispose_ends_session_and_sweeps_leftovers() {
    let fx = fixture();
    let file = php(&fx.root, "H.php");
    let dir = fx.root.join(".rector-tmp");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Stale.rector.tmp.php"), "old").unwrap();

    let (outcome, swept) = tokio::join!(
        fx.controller.show_diff(&file, DIFF, || async { Ok(()) }),
        async {
            presenting(&fx.controller).await;
            fx.controller.dispose().await
        }
    );

    assert_eq!(outcome.unwrap(), SessionOutcome::Superseded);
    assert_eq!(swept, 1);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    assert_eq!(fx.controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn decisions_without_a_session_are_ignored() {
    let fx = fixture();
    assert!(!fx.controller.apply());
    assert!(!fx.controller.discard());
    fx.controller.view_event(ViewEvent::VisibleEditorsChanged);
    assert_eq!(fx.controller.state(), SessionState::Idle);
    assert_eq!(fx.controller.dispose().await, 0);
}
