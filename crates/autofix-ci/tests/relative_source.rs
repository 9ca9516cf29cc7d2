//! A source path given relative to the working directory, from a
//! subdirectory of the repository, as `cd src && autofix run Main.java` does.
//!
//! Kept in its own test binary: it changes the process working directory.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use autofix_ci::fakes::FakeCompletionClient;
use autofix_ci::{
    GitPublisher, PublishConfig, RepairPipeline, RepairSpec, StageConfig, ToolchainConfig,
};
use autofix_core::{RunState, ValidationOutcome};

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn test_relative_source_from_subdirectory_is_published() {
    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("src");
    std::fs::create_dir(&src).unwrap();
    run_git(work.path(), &["init"]);
    run_git(work.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(src.join("Main.java"), "broken\n").unwrap();
    run_git(work.path(), &["add", "src/Main.java"]);
    run_git(
        work.path(),
        &["-c", "user.name=dev", "-c", "user.email=dev@example.com", "commit", "-m", "init"],
    );
    let before = run_git(work.path(), &["rev-parse", "HEAD"]);

    std::env::set_current_dir(&src).unwrap();

    let config = PublishConfig {
        push: false,
        ..Default::default()
    };
    let pipeline = RepairPipeline::new(
        Arc::new(FakeCompletionClient::returning("fixed\n")),
        Arc::new(GitPublisher::new(work.path(), config)),
    );
    let spec = RepairSpec::new("Main.java").with_toolchain(ToolchainConfig {
        build: StageConfig::custom("build".to_string(), sh("true"), 30),
        run: StageConfig::custom("run".to_string(), sh("true"), 30),
    });
    let result = pipeline.run(&spec).await;

    assert_eq!(result.outcome(), Some(ValidationOutcome::Passed));
    assert_eq!(result.state(), RunState::Published, "error: {:?}", result.error);

    let receipt = result.receipt.expect("receipt");
    assert_ne!(receipt.commit_sha, before);
    assert_eq!(run_git(work.path(), &["rev-parse", "HEAD"]), receipt.commit_sha);
    assert_eq!(
        run_git(work.path(), &["show", "HEAD:src/Main.java"]),
        "fixed"
    );
    assert_eq!(run_git(work.path(), &["status", "--porcelain"]), "");
}
