//! Integration tests for the commit pipeline.
//!
//! These tests drive `Committer` and the pipeline stages against `MockForge`
//! with real files on disk, and verify:
//! - The five gateway calls run in order, once each
//! - Overlay semantics: paths not committed are inherited from the tip
//! - Concurrent pushes are detected and never overwritten without force
//! - Failures at any step leave the branch untouched

use std::fs;
use std::path::Path;
use std::sync::{Arc, Once};

use tempfile::TempDir;

use treepush::commit::{CommitError, Committer, ErrorKind, Pipeline};
use treepush::core::types::RepoCoordinates;
use treepush::forge::mock::{FailOn, MockForge, MockOperation};
use treepush::forge::{ForgeError, GitDataForge};
use treepush::stage::{BinaryPolicy, ObjectMode, TreeItem, TreeItemBuilder};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (`RUST_LOG=treepush=debug`).
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn coords(branch: &str) -> RepoCoordinates {
    RepoCoordinates::parse("octocat", "hello", branch).unwrap()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn committer(forge: &MockForge, root: &Path) -> Committer {
    Committer::new(
        Arc::new(forge.clone()),
        coords("main"),
        TreeItemBuilder::new(root),
    )
}

mod round_trip {
    use super::*;

    #[tokio::test]
    async fn single_text_file() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        let c0 = forge.seed_branch("main", &[("README.md", "readme")]);

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", true)
            .await
            .unwrap();

        assert_eq!(outcome.parent, c0);
        assert_eq!(forge.branch_tip("main"), Some(outcome.commit.clone()));

        let ops = forge.operations();
        assert_eq!(
            ops,
            vec![
                MockOperation::FetchLatestCommit {
                    branch: "main".into()
                },
                MockOperation::FetchBaseTree { commit: c0.clone() },
                MockOperation::CreateTree {
                    base_tree: Some(outcome.base_tree.clone()),
                    paths: vec!["a.txt".into()],
                },
                MockOperation::CreateCommit {
                    tree: outcome.tree.clone(),
                    parent: c0.clone(),
                    message: "msg".into(),
                },
                MockOperation::UpdateRef {
                    branch: "main".into(),
                    commit: outcome.commit.clone(),
                    force: true,
                },
            ]
        );

        assert_eq!(forge.read_file(&outcome.commit, "a.txt").as_deref(), Some("hello"));
        assert_eq!(forge.file_mode(&outcome.commit, "a.txt"), Some(ObjectMode::Normal));
        let commit = forge.commit(&outcome.commit).unwrap();
        assert_eq!(commit.parents, vec![c0]);
        assert_eq!(commit.tree, outcome.tree);
    }

    #[tokio::test]
    async fn unlisted_paths_inherited_from_tip() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/new.rs", "new");
        write(dir.path(), "README.md", "updated");
        let forge = MockForge::new();
        forge.seed_branch(
            "main",
            &[("README.md", "old"), ("src/lib.rs", "lib"), ("LICENSE", "mit")],
        );

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["src/new.rs", "README.md"], "update", false)
            .await
            .unwrap();

        assert_eq!(
            forge.list_files(&outcome.commit),
            vec!["LICENSE", "README.md", "src/lib.rs", "src/new.rs"]
        );
        assert_eq!(forge.read_file(&outcome.commit, "README.md").as_deref(), Some("updated"));
        assert_eq!(forge.read_file(&outcome.commit, "src/lib.rs").as_deref(), Some("lib"));
    }

    #[tokio::test]
    async fn tree_entries_visible_through_fetch_tree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        forge.seed_branch("main", &[("b.txt", "b")]);

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", false)
            .await
            .unwrap();

        let entries = forge.fetch_tree(&coords("main"), &outcome.tree).await.unwrap();
        let listed: Vec<_> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.mode.as_str(), e.kind.as_str()))
            .collect();
        assert_eq!(
            listed,
            vec![("a.txt", "100644", "blob"), ("b.txt", "100644", "blob")]
        );
        assert_eq!(entries[0].size, Some(5));
    }

    #[tokio::test]
    async fn commits_target_configured_branch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        let main_tip = forge.seed_branch("main", &[]);
        forge.seed_branch("release", &[]);

        let committer = Committer::new(
            Arc::new(forge.clone()),
            coords("release"),
            TreeItemBuilder::new(dir.path()),
        );
        let outcome = committer
            .commit_paths(&["a.txt"], "release fix", false)
            .await
            .unwrap();

        assert_eq!(forge.branch_tip("release"), Some(outcome.commit));
        assert_eq!(forge.branch_tip("main"), Some(main_tip));
    }
}

#[cfg(unix)]
mod file_modes {
    use super::*;
    use std::os::unix::fs::{symlink, PermissionsExt};

    #[tokio::test]
    async fn executable_and_symlink_modes_preserved() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "run.sh", "#!/bin/sh\n");
        fs::set_permissions(dir.path().join("run.sh"), fs::Permissions::from_mode(0o755))
            .unwrap();
        write(dir.path(), "target.txt", "payload");
        symlink("target.txt", dir.path().join("link")).unwrap();

        let forge = MockForge::new();
        forge.seed_branch("main", &[]);

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["run.sh", "link"], "modes", false)
            .await
            .unwrap();

        assert_eq!(forge.file_mode(&outcome.commit, "run.sh"), Some(ObjectMode::Executable));
        assert_eq!(forge.file_mode(&outcome.commit, "link"), Some(ObjectMode::Symlink));
        assert_eq!(forge.read_file(&outcome.commit, "link").as_deref(), Some("target.txt"));
    }

    #[tokio::test]
    async fn socket_rejected_before_any_request() {
        let dir = TempDir::new().unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(dir.path().join("sock")).unwrap();
        let forge = MockForge::new();
        forge.seed_branch("main", &[]);

        let err = committer(&forge, dir.path())
            .commit_paths(&["sock"], "msg", false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FileSystem);
        assert!(forge.operations().is_empty());
    }
}

mod directories {
    use super::*;

    #[tokio::test]
    async fn nested_directories_created_bottom_up() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pkg/mod.rs", "mod");
        write(dir.path(), "pkg/inner/deep.rs", "deep");
        let forge = MockForge::new();
        forge.seed_branch("main", &[("README.md", "hi")]);

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["pkg"], "add pkg", false)
            .await
            .unwrap();

        assert_eq!(
            forge.operation_names(),
            vec![
                "fetch_latest_commit",
                "fetch_base_tree",
                "create_tree",
                "create_tree",
                "create_tree",
                "create_commit",
                "update_ref",
            ]
        );
        // Subtrees have no base; only the top-level tree overlays the tip.
        let bases: Vec<_> = forge
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CreateTree { base_tree, paths } => Some((base_tree.is_some(), paths)),
                _ => None,
            })
            .collect();
        assert_eq!(
            bases,
            vec![
                (false, vec!["deep.rs".to_string()]),
                (false, vec!["inner".to_string(), "mod.rs".to_string()]),
                (true, vec!["pkg".to_string()]),
            ]
        );

        assert_eq!(
            forge.list_files(&outcome.commit),
            vec!["README.md", "pkg/inner/deep.rs", "pkg/mod.rs"]
        );
        assert_eq!(forge.file_mode(&outcome.commit, "pkg"), Some(ObjectMode::Directory));
    }

    #[tokio::test]
    async fn empty_directory_rejected_before_any_request() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let forge = MockForge::new();
        forge.seed_branch("main", &[]);

        let err = committer(&forge, dir.path())
            .commit_paths(&["empty"], "msg", false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FileSystem);
        assert!(forge.operations().is_empty());
    }
}

mod binary_files {
    use super::*;

    #[tokio::test]
    async fn rejected_by_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("logo.png"), [0x89, 0x50, 0x4e, 0x47, 0xff]).unwrap();
        let forge = MockForge::new();
        forge.seed_branch("main", &[]);

        let err = committer(&forge, dir.path())
            .commit_paths(&["logo.png"], "logo", false)
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::Stage(_)));
        assert!(forge.operations().is_empty());
    }

    #[tokio::test]
    async fn uploaded_as_blob_when_enabled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("logo.png"), [0x89, 0x50, 0x4e, 0x47, 0xff]).unwrap();
        write(dir.path(), "notes.txt", "notes");
        let forge = MockForge::new();
        forge.seed_branch("main", &[]);

        let committer = Committer::new(
            Arc::new(forge.clone()),
            coords("main"),
            TreeItemBuilder::new(dir.path()).with_binary_policy(BinaryPolicy::Upload),
        );
        let outcome = committer
            .commit_paths(&["notes.txt", "logo.png"], "logo", false)
            .await
            .unwrap();

        assert_eq!(
            forge.operation_names(),
            vec![
                "fetch_latest_commit",
                "fetch_base_tree",
                "create_blob",
                "create_tree",
                "create_commit",
                "update_ref",
            ]
        );
        assert_eq!(forge.list_files(&outcome.commit), vec!["logo.png", "notes.txt"]);
        // Not valid UTF-8, so not readable as text.
        assert_eq!(forge.read_file(&outcome.commit, "logo.png"), None);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_push_is_conflict_and_branch_keeps_their_commit() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        let c0 = forge.seed_branch("main", &[]);
        forge.push_concurrently_before_update("main");

        let err = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", false)
            .await
            .unwrap_err();

        let cx = forge.branch_tip("main").unwrap();
        assert_ne!(cx, c0);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        match err {
            CommitError::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, c0);
                assert_eq!(actual, cx);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // The concurrent commit is still the tip, untouched by the failed update.
        assert_eq!(forge.commit(&cx).unwrap().message, "concurrent push");
    }

    #[tokio::test]
    async fn force_overwrites_concurrent_push() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        let c0 = forge.seed_branch("main", &[]);
        forge.push_concurrently_before_update("main");

        let outcome = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", true)
            .await
            .unwrap();

        assert_eq!(outcome.parent, c0);
        assert_eq!(forge.branch_tip("main"), Some(outcome.commit));
    }

    #[tokio::test]
    async fn manual_stages_detect_move_between_read_and_update() {
        let forge = MockForge::new();
        let c0 = forge.seed_branch("main", &[("README.md", "hi")]);
        let c = coords("main");
        let items = [TreeItem::with_content("a.txt", ObjectMode::Normal, "hello")];

        let base = Pipeline::new(&forge, &c)
            .fetch_latest_commit()
            .await
            .unwrap()
            .fetch_base_tree()
            .await
            .unwrap();
        assert_eq!(base.parent(), &c0);

        let cx = forge.advance_branch("main", "someone else");

        let err = base
            .create_tree(&items)
            .await
            .unwrap()
            .create_commit("msg")
            .await
            .unwrap()
            .update_ref(false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommitError::Conflict { ref actual, .. } if *actual == cx
        ));
        assert_eq!(forge.branch_tip("main"), Some(cx));
    }

    #[tokio::test]
    async fn independent_branches_commit_concurrently() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        forge.seed_branch("one", &[]);
        forge.seed_branch("two", &[]);

        let make = |branch: &str| {
            Committer::new(
                Arc::new(forge.clone()),
                coords(branch),
                TreeItemBuilder::new(dir.path()),
            )
        };
        let (one, two) = (make("one"), make("two"));
        let (r1, r2) = tokio::join!(
            one.commit_paths(&["a.txt"], "one", false),
            two.commit_paths(&["a.txt"], "two", false),
        );

        assert_eq!(forge.branch_tip("one"), Some(r1.unwrap().commit));
        assert_eq!(forge.branch_tip("two"), Some(r2.unwrap().commit));
    }
}

mod failures {
    use super::*;

    async fn commit_with(fail_on: FailOn) -> (MockForge, CommitError, usize) {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();
        forge.seed_branch("main", &[]);
        let forge = forge.fail_on(fail_on);
        let tip = forge.branch_tip("main").unwrap();

        let err = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", false)
            .await
            .unwrap_err();

        assert_eq!(forge.branch_tip("main"), Some(tip));
        let calls = forge.operations().len();
        (forge, err, calls)
    }

    #[tokio::test]
    async fn missing_branch_is_not_found() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let forge = MockForge::new();

        let err = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(forge.operation_names(), vec!["fetch_latest_commit"]);
    }

    #[tokio::test]
    async fn auth_failure_stops_at_first_step() {
        let (_, err, calls) =
            commit_with(FailOn::FetchLatestCommit(ForgeError::AuthFailed("bad".into()))).await;
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn transport_failure_on_base_tree() {
        let (_, err, calls) =
            commit_with(FailOn::FetchBaseTree(ForgeError::Transport("timed out".into()))).await;
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn validation_failure_on_tree() {
        let (_, err, calls) =
            commit_with(FailOn::CreateTree(ForgeError::Validation("bad tree".into()))).await;
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn commit_failure_leaves_orphan_tree() {
        let (forge, err, calls) =
            commit_with(FailOn::CreateCommit(ForgeError::Api {
                status: 500,
                message: "boom".into(),
            }))
            .await;
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(calls, 4);
        // The seed tree plus the tree created before the failure.
        assert_eq!(forge.tree_count(), 2);
    }

    #[tokio::test]
    async fn ref_update_failure_keeps_tip() {
        let (_, err, calls) =
            commit_with(FailOn::UpdateRef(ForgeError::AuthFailed("read-only".into()))).await;
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn retry_after_clearing_failure_succeeds() {
        let (forge, _, _) =
            commit_with(FailOn::CreateCommit(ForgeError::Transport("reset".into()))).await;
        forge.clear_fail_on();
        forge.clear_operations();

        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let outcome = committer(&forge, dir.path())
            .commit_paths(&["a.txt"], "msg", false)
            .await
            .unwrap();
        assert_eq!(forge.operations().len(), 5);
        assert_eq!(forge.branch_tip("main"), Some(outcome.commit));
    }
}
