//! Record-replay round trip of a full impact analysis.
//!
//! 1. Run an analysis against a real temporary git repository and a scripted
//!    build index, recording every port interaction.
//! 2. Replay the cassette through `ServiceContext::replaying()` and assert the
//!    same report comes out.
//! 3. Replay it through the binary and check the printed JSON.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use snapimpact::adapters::live::git::LiveGitRepo;
use snapimpact::adapters::recording::build_index::RecordingBuildIndex;
use snapimpact::adapters::recording::git::RecordingGitRepo;
use snapimpact::cassette::recorder::CassetteRecorder;
use snapimpact::config::Config;
use snapimpact::context::ServiceContext;
use snapimpact::impact::{ImpactAnalyzer, ImpactOutcome, ImpactReport};
use snapimpact::ports::{BranchHistory, BuildIndex, BuildRef, BuildStatus, IndexFuture};

const STATS: &str = r#"{
    "modules": [
        { "id": 1, "name": "./.storybook/generated-stories-entry.js", "reasons": [] },
        { "id": 2, "name": "./src/util.stories.ts", "reasons": [{ "moduleName": "./.storybook/generated-stories-entry.js" }] },
        { "id": 3, "name": "./src/util.ts", "reasons": [{ "moduleName": "./src/util.stories.ts" }] },
        { "id": 4, "name": "./src/other.stories.ts", "reasons": [{ "moduleName": "./.storybook/generated-stories-entry.js" }] }
    ]
}"#;

/// A build index that knows about exactly one build.
struct ScriptedIndex {
    build: BuildRef,
}

impl BuildIndex for ScriptedIndex {
    fn branch_history(&self, _branch: &str) -> IndexFuture<'_, BranchHistory> {
        Box::pin(async {
            Ok(BranchHistory { first_build_committed_at: Some(0), ..BranchHistory::default() })
        })
    }

    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>> {
        let found = commits.iter().filter(|c| **c == self.build.commit).cloned().collect();
        Box::pin(async move { Ok(found) })
    }

    fn ancestor_builds(&self, _number: u64, _skip: usize, _limit: usize) -> IndexFuture<'_, Vec<BuildRef>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn baseline_builds(&self, _branch: &str, parent_commits: &[String]) -> IndexFuture<'_, Vec<BuildRef>> {
        let found = parent_commits.iter().filter(|c| **c == self.build.commit).map(|_| self.build.clone()).collect();
        Box::pin(async move { Ok(found) })
    }
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Dev")
        .env("GIT_AUTHOR_EMAIL", "dev@example.com")
        .env("GIT_COMMITTER_NAME", "Dev")
        .env("GIT_COMMITTER_EMAIL", "dev@example.com")
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Two commits; the second edits a file imported by one story.
fn project() -> (tempfile::TempDir, PathBuf, String) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/util.ts"), "export const a = 1;\n").unwrap();
    std::fs::write(root.join("src/util.stories.ts"), "import './util';\n").unwrap();
    git(&root, &["init", "-q", "-b", "main"]);
    git(&root, &["add", "."]);
    git(&root, &["commit", "-q", "-m", "first"]);
    let first = git(&root, &["rev-parse", "HEAD"]);

    std::fs::write(root.join("src/util.ts"), "export const a = 2;\n").unwrap();
    git(&root, &["commit", "-q", "-am", "second"]);
    std::fs::write(root.join("preview-stats.json"), STATS).unwrap();
    (dir, root, first)
}

fn scripted_index(commit: &str) -> ScriptedIndex {
    ScriptedIndex {
        build: BuildRef {
            id: "build-1".into(),
            number: 1,
            commit: commit.into(),
            status: BuildStatus::Passed,
            committed_at: 0,
            is_local: false,
            uncommitted_hash: None,
        },
    }
}

async fn record(root: &Path, first: &str, cassette: &Path) -> ImpactReport {
    let recorder = Arc::new(Mutex::new(CassetteRecorder::new(cassette, "impact", "unknown")));
    let git = RecordingGitRepo::new(Box::new(LiveGitRepo::in_dir(root)), Arc::clone(&recorder));
    let index = RecordingBuildIndex::new(Box::new(scripted_index(first)), Arc::clone(&recorder));
    let config = Config::default();

    let report = ImpactAnalyzer::new(&git, &index, &config, root)
        .analyze(Some(Path::new("preview-stats.json")))
        .await
        .expect("live analysis should succeed");
    recorder.lock().unwrap().save().expect("cassette should be written");
    report
}

#[tokio::test]
async fn recorded_analysis_replays_to_the_same_report() {
    let (_dir, root, first) = project();
    let cassette = root.join("cassettes/impact.cassette.yaml");

    let live = record(&root, &first, &cassette).await;
    assert_eq!(live.parent_commits, vec![first.clone()]);
    assert_eq!(live.changed_files, vec!["src/util.ts"]);
    let ImpactOutcome::Affected { modules } = &live.outcome else {
        panic!("expected affected modules, got {:?}", live.outcome);
    };
    assert_eq!(modules.keys().collect::<Vec<_>>(), vec!["2"]);

    let ctx = ServiceContext::replaying(&cassette).unwrap();
    let config = Config::default();
    let replayed = ImpactAnalyzer::new(&*ctx.git, &*ctx.index, &config, &root)
        .analyze(Some(Path::new("preview-stats.json")))
        .await
        .expect("replayed analysis should succeed");
    assert_ne!(replayed.run_id, live.run_id);
    assert_eq!(ImpactReport { run_id: live.run_id.clone(), ..replayed }, live);
}

#[tokio::test]
async fn binary_replays_a_recorded_cassette() {
    let (_dir, root, first) = project();
    let cassette = root.join("cassettes/impact.cassette.yaml");
    record(&root, &first, &cassette).await;

    let output = Command::new(env!("CARGO_BIN_EXE_snapimpact"))
        .current_dir(&root)
        .args(["impact", "--stats", "preview-stats.json", "--replay"])
        .arg(&cassette)
        .env_remove("SNAPIMPACT_RECORD")
        .output()
        .expect("failed to run snapimpact binary");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"]["kind"], "affected");
    assert_eq!(report["outcome"]["modules"]["2"][0], "src/util.ts");
    assert_eq!(report["baseline_commits"][0], first.as_str());
}
