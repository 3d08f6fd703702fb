#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use droidmut::classfile::{artifact_path, Annotation, ClassFile, MethodBody, ACC_PUBLIC};
use droidmut::coverage::{ExecutionData, ExecutionRecord};
use droidmut::discovery::{RUN_WITH, TEST};
use droidmut::insn::{Insn, Opcode};
use droidmut::safety;
use tempfile::TempDir;

fn droidmut_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    // test binary is in target/debug/deps/, droidmut binary is in target/debug/
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("droidmut");
    path
}

fn write_class(dir: &Path, class: &ClassFile) -> PathBuf {
    let path = artifact_path(dir, &class.name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, class.to_bytes().unwrap()).unwrap();
    path
}

struct Project {
    dir: TempDir,
    classes: PathBuf,
    test_classes: PathBuf,
    net_artifact: PathBuf,
}

/// An application with two https endpoints and one TLS context, a single
/// instrumented test, and a fake device bridge whose test fails only when the
/// api endpoint was downgraded. Coverage reports only the Net class.
fn create_project() -> Project {
    let dir = TempDir::new().unwrap();
    let classes = dir.path().join("classes");
    let test_classes = dir.path().join("test-classes");

    let mut net = ClassFile::new("com/example/Net");
    net.source_file = Some("Net.java".into());
    net.methods.push(MethodBody::new(
        "endpoints",
        "()V",
        ACC_PUBLIC,
        vec![
            Insn::label(0),
            Insn::line(10, 0),
            Insn::ldc_str("https://api.example.com"),
            Insn::var(Opcode::Astore, 1),
            Insn::label(1),
            Insn::line(11, 1),
            Insn::ldc_str("https://cdn.example.com"),
            Insn::var(Opcode::Astore, 2),
            Insn::simple(Opcode::Return),
        ],
    ));
    let net_artifact = write_class(&classes, &net);

    let mut tls = ClassFile::new("com/example/Tls");
    tls.methods.push(MethodBody::new(
        "context",
        "()Ljavax/net/ssl/SSLContext;",
        ACC_PUBLIC,
        vec![
            Insn::label(0),
            Insn::line(20, 0),
            Insn::ldc_str("TLS"),
            Insn::invoke(
                Opcode::Invokestatic,
                "javax/net/ssl/SSLContext",
                "getInstance",
                "(Ljava/lang/String;)Ljavax/net/ssl/SSLContext;",
                false,
            ),
            Insn::simple(Opcode::Areturn),
        ],
    ));
    write_class(&classes, &tls);

    let mut test = ClassFile::new("com/example/NetTest");
    test.annotations.push(Annotation {
        descriptor: RUN_WITH.into(),
        value: Some("Landroidx/test/ext/junit/runners/AndroidJUnit4;".into()),
    });
    let mut fetches = MethodBody::new("fetches", "()V", ACC_PUBLIC, vec![Insn::simple(Opcode::Return)]);
    fetches.annotations.push(Annotation { descriptor: TEST.into(), value: None });
    test.methods.push(fetches);
    write_class(&test_classes, &test);

    let coverage = ExecutionData {
        sessions: vec![],
        records: vec![ExecutionRecord { id: 1, name: "com/example/Net".into(), probes: vec![true, true, true] }],
    };
    let coverage_path = dir.path().join("coverage.ec");
    std::fs::write(&coverage_path, coverage.to_bytes()).unwrap();

    let script = format!(
        r#"#!/bin/sh
if [ "$2" = "run-as" ]; then
    cat "$5"
    exit 0
fi
code=0
if grep -q 'http://api' '{artifact}'; then
    code=-2
fi
echo "INSTRUMENTATION_STATUS_CODE: 1"
echo "INSTRUMENTATION_STATUS_CODE: $code"
echo "INSTRUMENTATION_RESULT: coverageFilePath={coverage}"
echo "INSTRUMENTATION_CODE: -1"
"#,
        artifact = net_artifact.display(),
        coverage = coverage_path.display(),
    );
    std::fs::write(dir.path().join("fake_adb.sh"), script).unwrap();

    Project { dir, classes, test_classes, net_artifact }
}

impl Project {
    fn command(&self) -> Command {
        let mut cmd = Command::new(droidmut_bin());
        cmd.current_dir(self.dir.path())
            .env("DROIDMUT_CLASSFILES_PATH", &self.classes)
            .env("DROIDMUT_PKGNAME", "com.example.test")
            .env("DROIDMUT_TESTED_APP_ID", "com.example")
            .env("DROIDMUT_ADB", format!("sh {}", self.dir.path().join("fake_adb.sh").display()))
            .env_remove("DROIDMUT_INSTRUMENTATION_RUNNER")
            .env_remove("DROIDMUT_INSTRUMENTED_TESTS_PATH");
        cmd
    }

    fn run(&self, extra: &[&str]) -> std::process::Output {
        self.command()
            .arg("run")
            .arg("--test-classes")
            .arg(&self.test_classes)
            .arg("--no-package")
            .args(extra)
            .output()
            .unwrap()
    }
}

#[test]
fn e2e_full_run_json_output() {
    let project = create_project();
    let original = std::fs::read(&project.net_artifact).unwrap();

    let output = project.run(&["--json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout: {stdout}\nstderr: {}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(result["total"], 3);
    assert_eq!(result["killed"], 1);
    assert_eq!(result["survived"], 2);
    assert_eq!(result["no_coverage"], 1);
    let survivors = result["survived_mutants"].as_array().unwrap();
    assert_eq!(survivors[0]["ref_id"], "m1");
    assert_eq!(survivors[0]["line"], 11);
    assert_eq!(survivors[0]["file"], "Net.java");
    assert_eq!(survivors[1]["policy"], "ssl_context_protocol");
    assert_eq!(survivors[1]["status"], "NoCoverage");

    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);
    assert!(safety::check_interrupted_run(&project.classes).is_empty());
    // The lock went away with the process.
    safety::DirLock::acquire(&project.classes, "after-run").unwrap();
}

#[test]
fn e2e_show_and_status_after_run() {
    let project = create_project();
    project.run(&["-q"]);
    assert!(project.dir.path().join(".droidmut-state.json").exists());

    let status = project.command().args(["status", "--json"]).output().unwrap();
    assert_eq!(status.status.code(), Some(0));
    let state: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(state["total"], 3);

    let show = project.command().args(["show", "@m1", "--json"]).output().unwrap();
    assert_eq!(show.status.code(), Some(0));
    let mutant: serde_json::Value = serde_json::from_slice(&show.stdout).unwrap();
    assert!(mutant["diff"].as_str().unwrap().contains("http://cdn.example.com"));

    let missing = project.command().args(["show", "@m9"]).output().unwrap();
    assert_eq!(missing.status.code(), Some(2));
}

#[test]
fn e2e_quiet_mode_no_output() {
    let project = create_project();
    let output = project.run(&["-q"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn e2e_status_without_run() {
    let project = create_project();
    let output = project.command().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn e2e_list_sites() {
    let project = create_project();
    let output = project.command().args(["list", "--json"]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    let sites: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let sites = sites.as_array().unwrap();
    assert_eq!(sites.len(), 3);
    assert_eq!(sites[0]["id"]["policy"], "https_to_http");
    assert_eq!(sites[0]["line"], 10);
    assert_eq!(sites[2]["id"]["class_name"], "com/example/Tls");
}

#[test]
fn e2e_unknown_mutator() {
    let project = create_project();
    let output = project.run(&["--mutators", "no_such_policy"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no_such_policy"));
}

#[test]
fn e2e_missing_test_classes() {
    let project = create_project();
    let output = project
        .command()
        .args(["run", "--no-package", "--test-classes"])
        .arg(project.dir.path().join("nope"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn e2e_recovers_interrupted_run() {
    let project = create_project();
    let original = std::fs::read(&project.net_artifact).unwrap();
    std::fs::write(safety::backup_path(&project.net_artifact), &original).unwrap();
    std::fs::write(&project.net_artifact, b"half written").unwrap();

    let output = project.run(&[]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);
    assert!(safety::check_interrupted_run(&project.classes).is_empty());
}

#[test]
fn e2e_locked_directory() {
    let project = create_project();
    let _lock = safety::DirLock::acquire(&project.classes, "other-run").unwrap();
    let output = project.run(&[]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn e2e_recovers_then_reruns_after_crash() {
    let project = create_project();
    let original = std::fs::read(&project.net_artifact).unwrap();
    // A killed run leaves its backup, a mutated class and its lock file behind.
    std::fs::write(safety::backup_path(&project.net_artifact), &original).unwrap();
    std::fs::write(&project.net_artifact, b"half written").unwrap();
    std::fs::write(project.classes.join(safety::LOCK_FILE), "dead0001").unwrap();

    let recovered = project.run(&[]);
    assert_eq!(recovered.status.code(), Some(3), "stderr: {}", String::from_utf8_lossy(&recovered.stderr));
    assert!(String::from_utf8_lossy(&recovered.stderr).contains("Recovered 1 class file"));
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);

    let rerun = project.run(&["--json"]);
    let stdout = String::from_utf8_lossy(&rerun.stdout);
    assert_eq!(rerun.status.code(), Some(1), "stdout: {stdout}\nstderr: {}", String::from_utf8_lossy(&rerun.stderr));
    let result: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(result["total"], 3);
    assert_eq!(result["killed"], 1);
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);
}

#[test]
fn e2e_live_session_backups_are_left_alone() {
    let project = create_project();
    let original = std::fs::read(&project.net_artifact).unwrap();
    let lock = safety::DirLock::acquire(&project.classes, "live0001").unwrap();
    let guard = safety::ArtifactGuard::install(&project.net_artifact, b"mutant in flight").unwrap();

    let output = project.run(&[]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), b"mutant in flight");
    assert!(safety::backup_path(&project.net_artifact).exists());

    guard.restore().unwrap();
    drop(lock);
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);
}

#[test]
fn e2e_interrupt_restores_and_releases_lock() {
    let project = create_project();
    let original = std::fs::read(&project.net_artifact).unwrap();
    let package = project.dir.path().join("package.sh");
    std::fs::write(
        &package,
        format!("if grep -q 'http://' '{}'; then sleep 20; fi\n", project.net_artifact.display()),
    )
    .unwrap();

    let mut child = project
        .command()
        .arg("run")
        .arg("--test-classes")
        .arg(&project.test_classes)
        .arg("--package-cmd")
        .arg(format!("sh {}", package.display()))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let backup = safety::backup_path(&project.net_artifact);
    let installed = Instant::now();
    while !backup.exists() {
        assert!(installed.elapsed() < Duration::from_secs(10), "mutant never installed");
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(200));
    unsafe {
        libc::kill(child.id() as i32, libc::SIGINT);
    }

    let interrupted = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if interrupted.elapsed() > Duration::from_secs(10) {
            child.kill().unwrap();
            panic!("run did not stop after interrupt");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status.code(), Some(3));
    assert_eq!(std::fs::read(&project.net_artifact).unwrap(), original);
    assert!(safety::check_interrupted_run(&project.classes).is_empty());
    safety::DirLock::acquire(&project.classes, "after-interrupt").unwrap();
}
