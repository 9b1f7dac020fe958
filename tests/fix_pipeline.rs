use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_MANIFEST: &str = r#"{
  "name": "demo-app",
  "dependencies": {
    "left-pad": "1.0.0"
  }
}"#;

fn unique_temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("depsensei-{nanos}-{name}"))
}

fn write_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("project dir");
    fs::write(dir.path().join("package.json"), PROJECT_MANIFEST).expect("write manifest");
    dir
}

fn run_fix(project: &Path, registry_url: &str, extra_args: &[&str]) -> Output {
    let mut args = vec!["fix".to_string(), project.to_string_lossy().into_owned()];
    args.extend(extra_args.iter().map(|arg| arg.to_string()));
    Command::new(env!("CARGO_BIN_EXE_depsensei"))
        .args(&args)
        .env("DEPSENSEI_NPM_REGISTRY_BASE_URL", registry_url)
        .env(
            "DEPSENSEI_CONFIG_GLOBAL_PATH",
            unique_temp_path("no-global.toml"),
        )
        .env(
            "DEPSENSEI_CONFIG_PROJECT_PATH",
            unique_temp_path("no-project.toml"),
        )
        .output()
        .expect("run depsensei")
}

async fn mount_left_pad(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dist-tags": { "latest": "1.3.0" },
            "versions": { "1.3.0": {} },
        })))
        .mount(server)
        .await;
}

fn manifest_version(project: &Path) -> String {
    let raw = fs::read_to_string(project.join("package.json")).expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&raw).expect("parse manifest");
    manifest["dependencies"]["left-pad"]
        .as_str()
        .expect("left-pad entry")
        .to_string()
}

#[tokio::test]
async fn dry_run_plans_fixes_without_touching_the_manifest() {
    let server = MockServer::start().await;
    mount_left_pad(&server).await;
    let project = write_project();

    let output = run_fix(project.path(), &server.uri(), &["--dry-run"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Update left-pad"));
    assert!(stdout.contains("Dry run: no files were modified."));

    let raw = fs::read_to_string(project.path().join("package.json")).expect("read manifest");
    assert_eq!(raw, PROJECT_MANIFEST);
    assert!(!project.path().join("package.json.depsensei.backup").exists());
}

#[tokio::test]
async fn fix_without_force_only_prints_the_plan() {
    let server = MockServer::start().await;
    mount_left_pad(&server).await;
    let project = write_project();

    let output = run_fix(project.path(), &server.uri(), &[]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Re-run with --force to apply these fixes."));

    let raw = fs::read_to_string(project.path().join("package.json")).expect("read manifest");
    assert_eq!(raw, PROJECT_MANIFEST);
}

#[tokio::test]
async fn forced_fix_backs_up_and_rewrites_the_manifest() {
    let server = MockServer::start().await;
    mount_left_pad(&server).await;
    let project = write_project();

    let output = run_fix(project.path(), &server.uri(), &["--force", "--no-install"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Fixes applied successfully."));

    assert_eq!(manifest_version(project.path()), "1.3.0");

    let backup = fs::read_to_string(project.path().join("package.json.depsensei.backup"))
        .expect("read backup");
    assert_eq!(backup, PROJECT_MANIFEST);
}

#[tokio::test]
async fn forced_fix_honors_no_backup() {
    let server = MockServer::start().await;
    mount_left_pad(&server).await;
    let project = write_project();

    let output = run_fix(
        project.path(),
        &server.uri(),
        &["--force", "--no-backup", "--no-install"],
    );
    assert!(output.status.success());

    assert_eq!(manifest_version(project.path()), "1.3.0");
    assert!(!project.path().join("package.json.depsensei.backup").exists());
}

#[tokio::test]
async fn up_to_date_project_needs_no_fixes() {
    let server = MockServer::start().await;
    mount_left_pad(&server).await;

    let project = tempfile::tempdir().expect("project dir");
    fs::write(
        project.path().join("package.json"),
        r#"{"name":"demo-app","dependencies":{"left-pad":"1.3.0"}}"#,
    )
    .expect("write manifest");

    let output = run_fix(project.path(), &server.uri(), &["--force"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No issues found."));
}

#[cfg(unix)]
mod sandbox_validation {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_stub(dir: &Path, script: &str) -> PathBuf {
        let stub = dir.join("pm-stub.sh");
        fs::write(&stub, script).expect("write stub");
        let mut perms = fs::metadata(&stub).expect("stub metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&stub, perms).expect("chmod stub");
        stub
    }

    fn write_project_config(stub: &Path) -> PathBuf {
        let config_path = unique_temp_path("project.toml");
        fs::write(
            &config_path,
            format!("package_manager = \"{}\"\n", stub.display()),
        )
        .expect("write config");
        config_path
    }

    #[tokio::test]
    async fn sandbox_validated_fix_is_applied() {
        let server = MockServer::start().await;
        mount_left_pad(&server).await;
        let project = write_project();
        let stub = write_stub(project.path(), "#!/bin/sh\nexit 0\n");
        let config_path = write_project_config(&stub);

        let output = Command::new(env!("CARGO_BIN_EXE_depsensei"))
            .args([
                "fix",
                &project.path().to_string_lossy(),
                "--force",
                "--sandbox",
                "--no-install",
                "--no-backup",
            ])
            .env("DEPSENSEI_NPM_REGISTRY_BASE_URL", server.uri())
            .env(
                "DEPSENSEI_CONFIG_GLOBAL_PATH",
                unique_temp_path("no-global.toml"),
            )
            .env("DEPSENSEI_CONFIG_PROJECT_PATH", &config_path)
            .output()
            .expect("run depsensei");
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

        assert_eq!(manifest_version(project.path()), "1.3.0");
        fs::remove_file(config_path).ok();
    }

    #[tokio::test]
    async fn sandbox_rejection_leaves_the_manifest_alone() {
        let server = MockServer::start().await;
        mount_left_pad(&server).await;
        let project = write_project();
        // First invocation provisions the sandbox and must succeed; every
        // later one (the post-fix install) fails.
        let marker = project.path().join("provisioned.marker");
        let stub = write_stub(
            project.path(),
            &format!(
                "#!/bin/sh\nif [ -f {marker} ]; then\n  echo \"install blew up\" >&2\n  exit 1\nfi\ntouch {marker}\nexit 0\n",
                marker = marker.display()
            ),
        );
        let config_path = write_project_config(&stub);

        let output = Command::new(env!("CARGO_BIN_EXE_depsensei"))
            .args([
                "fix",
                &project.path().to_string_lossy(),
                "--force",
                "--sandbox",
                "--no-install",
                "--no-backup",
            ])
            .env("DEPSENSEI_NPM_REGISTRY_BASE_URL", server.uri())
            .env(
                "DEPSENSEI_CONFIG_GLOBAL_PATH",
                unique_temp_path("no-global.toml"),
            )
            .env("DEPSENSEI_CONFIG_PROJECT_PATH", &config_path)
            .output()
            .expect("run depsensei");
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("No fix passed sandbox validation"));
        assert_eq!(manifest_version(project.path()), "1.0.0");
        fs::remove_file(config_path).ok();
    }
}
