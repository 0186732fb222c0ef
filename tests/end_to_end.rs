//! Watcher, controller and supervisor wired together with real processes.

use std::fs;
use std::time::Duration;

use tokio::sync::mpsc;

use reloadconf::controller::{Promoter, ReloadController, StartupOutcome};
use reloadconf::lifecycle::{OperatorSignal, Shutdown};
use reloadconf::supervisor::{ProcessSupervisor, StopOutcome};
use reloadconf::watcher::{observe, FileWatcher, WatchMode, WatchSettings};

mod common;

use common::{check_validator, eventually, within, Workspace};

const WAIT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn test_candidate_flows_to_daemon() {
    let ws = Workspace::new();
    ws.write_live("valid initial\n");

    let script = ws.script(
        "daemon.sh",
        r#"trap 'echo hup >> "$1"' HUP
touch "$2"
while true; do sleep 0.1; done"#,
    );
    let log = ws.path("hup.log");
    let ready = ws.path("ready");
    let command = format!("sh {} {} {}", script.display(), log.display(), ready.display());

    let settings = WatchSettings {
        watch_dir: ws.watch.clone(),
        candidate_name: "app.conf".into(),
        mode: WatchMode::Polling,
        quiescence: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
    };
    let mut controller = ReloadController::new(
        check_validator(),
        ProcessSupervisor::new(command.parse().unwrap()),
        Promoter::new(ws.live.clone()),
    );

    let shutdown = Shutdown::new();
    let (mut candidates, watcher) = observe(FileWatcher::new(settings), shutdown.subscribe());
    let (op_tx, mut op_rx) = mpsc::channel(4);

    assert_eq!(controller.startup().await.unwrap(), StartupOutcome::Started);
    eventually(WAIT, || ready.exists()).await;

    let live = ws.live.clone();
    let candidate = ws.candidate();
    let feeder = tokio::spawn(async move {
        fs::write(&candidate, "broken\n").unwrap();
        // The rejected candidate is removed once processed.
        while candidate.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        fs::write(&candidate, "valid replacement\n").unwrap();
        while fs::read_to_string(&live).ok().as_deref() != Some("valid replacement\n") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        op_tx.send(OperatorSignal::Shutdown).await.unwrap();
    });

    within(WAIT, controller.run(&mut candidates, &mut op_rx)).await.unwrap();
    within(WAIT, feeder).await.unwrap();

    assert_eq!(ws.live_content().as_deref(), Some("valid replacement\n"));
    eventually(WAIT, || fs::read_to_string(&log).is_ok_and(|s| s.lines().count() == 1)).await;

    shutdown.trigger();
    within(WAIT, watcher).await.unwrap();

    let outcome = within(WAIT, controller.shutdown(Duration::from_secs(5))).await.unwrap();
    assert!(matches!(outcome, StopOutcome::Exited(_)));
}
