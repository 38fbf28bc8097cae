use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn make_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
        .as_nanos();
    let pid = std::process::id();
    let dir = std::env::temp_dir().join(format!("runkit-integ-{prefix}-{pid}-{nanos}"));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

fn demo() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_runkit-demo"));
    cmd.env("RUST_LOG", "off");
    for var in [
        "DEMO_WORKERS",
        "DEMO_TICK",
        "DEMO_NAME",
        "ECHO_PREFIX",
        "GREET_NAME",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run runkit-demo")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn no_args_prints_usage() {
    let out = run(&mut demo());
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(
        err.starts_with("Usage: ") && err.contains("<command> [options]"),
        "unexpected usage:\n{err}"
    );
    for name in ["serve", "echo", "tools", " | greet"] {
        assert!(err.contains(name), "{name} missing from:\n{err}");
    }
}

#[test]
fn unknown_command_fails() {
    let out = run(demo().arg("nope"));
    assert!(!out.status.success());
    assert!(stderr(&out).starts_with("Unknown command: 'nope'\n"));
}

#[test]
fn echo_prints_positionals() {
    let out = run(demo().args(["echo", "--upper", "true", "hello", "big", "world"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "HELLO BIG WORLD\n");

    // a boolean flag never takes a positional as its value
    let out = run(demo().args(["echo", "--upper", "hello", "world"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "hello world\n");
}

#[test]
fn echo_reads_env_file() {
    let dir = make_temp_dir("envfile");
    let path = dir.join("demo.env");
    fs::write(&path, "ECHO_PREFIX=from-file:\n").expect("failed to write env file");

    let out = run(demo()
        .arg("echo")
        .arg("--envfile")
        .arg(&path)
        .args(["hello", "world"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "from-file:hello world\n");

    // flag beats the env file
    let out = run(demo()
        .arg("echo")
        .arg("--envfile")
        .arg(&path)
        .args(["--prefix", "flag:", "hi"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "flag:hi\n");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn echo_without_args_reports_required() {
    let out = run(demo().arg("echo"));
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("echo [options]"), "unexpected usage:\n{err}");
    assert!(err.contains("<arg0> : required"), "unexpected usage:\n{err}");
    assert!(err.contains("Flags and Env Vars:"), "unexpected usage:\n{err}");
}

#[test]
fn unknown_flag_exits_nonzero() {
    let out = run(demo().args(["serve", "--bogus", "1"]));
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("  --bogus : unknown flag"), "unexpected usage:\n{err}");
    assert!(
        err.contains("--workers / $DEMO_WORKERS - number of workers (default: 2)"),
        "unexpected usage:\n{err}"
    );
}

#[test]
fn serve_runs_all_workers() {
    let out = run(demo()
        .env("DEMO_NAME", "integ")
        .args(["serve", "--workers", "3", "--ticks", "2", "--tick", "1ms", "--verbose"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    let text = stdout(&out);
    for id in 0..3 {
        assert!(text.contains(&format!("worker-{id} tick 2")), "missing ticks:\n{text}");
    }
    assert!(text.ends_with("integ: 3 workers finished\n"), "stdout:\n{text}");
}

#[test]
fn serve_reports_first_failure() {
    let out = run(demo().args([
        "serve",
        "--workers=2",
        "--ticks=50",
        "--tick=5ms",
        "--fail-after=2",
    ]));
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(
        err.starts_with("Command \"serve\" returned error\n"),
        "unexpected stderr:\n{err}"
    );
    assert!(err.contains("worker-0 gave up after 2 ticks"), "unexpected stderr:\n{err}");
    assert!(!stdout(&out).contains("workers finished"));
}

#[test]
fn nested_greet_parses_json() {
    let out = run(demo().args([
        "tools",
        "greet",
        "--name",
        "Ada",
        "--style",
        r#"{"punctuation":"!","repeat":2}"#,
    ]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "Hello, Ada!\nHello, Ada!\n");

    let out = run(demo().args(["tools", "greet", "--style", "[]"]));
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(
        err.contains("Usage: ") && err.contains("tools greet [options]"),
        "unexpected stderr:\n{err}"
    );
}

#[test]
fn global_flags_before_command() {
    let out = run(demo().args(["--prefix", "> ", "echo", "hi"]));
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out), "> hi\n");
}

#[cfg(unix)]
#[test]
fn non_utf8_argument_prints_usage() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let out = run(demo()
        .arg("echo")
        .arg(OsString::from_vec(vec![b'h', 0xff, b'i'])));
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(
        err.starts_with("Invalid argument: 'h\u{fffd}i' is not valid UTF-8\nUsage: "),
        "unexpected stderr:\n{err}"
    );
    assert!(err.contains("echo"), "unexpected stderr:\n{err}");
}
