use std::{
    collections::BTreeSet,
    ffi::CString,
    fs,
    os::unix::ffi::OsStrExt,
    process::Stdio,
    thread,
    time::{Duration, Instant},
};

use crate::common::{ledger_lines, stdout_json, Workspace};

#[test]
fn register_then_lookup_and_list() {
    let workspace = Workspace::new();

    let output = workspace.ports(&["register", "camera"]);
    assert!(output.status.success(), "register failed: {output:?}");
    let registered = stdout_json(&output);
    let port = registered["port"].as_u64().expect("port is numeric");
    assert!((8000..9000).contains(&port), "port {port} outside default range");
    assert_eq!(ledger_lines(&workspace.ledger()), vec![format!("camera:{port}")]);

    let lookup = workspace.ports(&["lookup", "camera"]);
    assert!(lookup.status.success(), "lookup failed: {lookup:?}");
    assert_eq!(stdout_json(&lookup)["port"].as_u64(), Some(port));

    let list = workspace.ports(&["list"]);
    assert!(list.status.success(), "list failed: {list:?}");
    let listed = stdout_json(&list);
    assert_eq!(listed["services"][0]["service_name"], "camera");
    assert_eq!(listed["skipped_lines"], 0);
}

#[test]
fn explicit_port_is_recorded_even_when_taken() {
    let workspace = Workspace::new();
    workspace.seed_ledger("camera:8001\n");

    let output = workspace.ports(&["register", "speaker", "--port", "8001"]);
    assert!(output.status.success(), "register failed: {output:?}");
    assert_eq!(stdout_json(&output)["origin"], "explicit");
    assert_eq!(workspace.ledger_contents(), "camera:8001\nspeaker:8001\n");
}

#[test]
fn exhausted_range_exits_45_without_appending() {
    let workspace = Workspace::new();
    workspace.seed_ledger("camera:8500\n");

    let output = workspace.ports(&[
        "register",
        "mic",
        "--range-start",
        "8500",
        "--range-end",
        "8501",
        "--max-attempts",
        "3",
    ]);

    assert_eq!(output.status.code(), Some(45), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PORT_ALLOCATION_EXHAUSTED"), "{stderr}");
    assert_eq!(workspace.ledger_contents(), "camera:8500\n");
}

#[test]
fn unreadable_ledger_exits_46() {
    let workspace = Workspace::new();
    fs::create_dir(workspace.ledger()).expect("can create directory in ledger's place");

    let output = workspace.ports(&["register", "camera"]);
    assert_eq!(output.status.code(), Some(46), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("LEDGER_STORAGE_ERROR"), "{stderr}");
}

#[test]
fn blocked_ledger_read_exits_47_promptly() {
    let workspace = Workspace::new();
    // Opening a FIFO with no writer blocks the reader indefinitely.
    let path = CString::new(workspace.ledger().as_os_str().as_bytes()).expect("no nul in path");
    // SAFETY: `path` is a valid NUL-terminated string for the call's duration.
    let result = unsafe { libc::mkfifo(path.as_ptr(), 0o644) };
    assert_eq!(result, 0, "mkfifo failed: {}", std::io::Error::last_os_error());

    let mut child = workspace
        .command()
        .args(["ports", "register", "camera", "--timeout-secs", "1", "--ledger"])
        .arg(workspace.ledger())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn register");

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().expect("poll child") {
            break status;
        }
        if started.elapsed() > Duration::from_secs(5) {
            let _ = child.kill();
            let _ = child.wait();
            panic!("register did not exit after its timeout");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(47), "{status:?}");
}

#[test]
fn lookup_of_unknown_service_fails() {
    let workspace = Workspace::new();
    let output = workspace.ports(&["lookup", "speaker"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
}

#[test]
fn invalid_service_name_is_rejected_before_touching_the_ledger() {
    let workspace = Workspace::new();
    let output = workspace.ports(&["register", "cam:front"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert!(!workspace.ledger().exists());
}

#[test]
fn compact_keeps_latest_claim_per_service() {
    let workspace = Workspace::new();
    workspace.seed_ledger("camera:8001\nmic:8002\ncamera:8003\n");

    let output = workspace.ports(&["compact"]);
    assert!(output.status.success(), "compact failed: {output:?}");
    assert_eq!(workspace.ledger_contents(), "mic:8002\ncamera:8003\n");
}

#[test]
fn concurrent_processes_claim_distinct_ports() {
    let workspace = Workspace::new();
    let ledger = workspace.ledger();

    let children: Vec<_> = (0..8)
        .map(|index| {
            workspace
                .command()
                .args(["ports", "register", &format!("svc{index}")])
                .args(["--range-start", "8000", "--range-end", "8010"])
                .arg("--ledger")
                .arg(&ledger)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .expect("process should start")
        })
        .collect();

    for child in children {
        let output = child.wait_with_output().expect("child finishes");
        assert!(output.status.success(), "register failed: {output:?}");
    }

    let lines = ledger_lines(&ledger);
    assert_eq!(lines.len(), 8, "{lines:?}");
    let ports: BTreeSet<_> = lines
        .iter()
        .filter_map(|line| line.split_once(':').map(|(_, port)| port.to_string()))
        .collect();
    assert_eq!(ports.len(), 8, "duplicate ports claimed: {lines:?}");
}
