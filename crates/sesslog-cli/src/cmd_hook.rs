use sesslog_core::{SessionEvent, Source};
use sesslog_pipeline::{detect_machine, parse_hook_input, Settings};
use sesslog_summarize::RUNNING_ENV;
use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};

/// `sesslog hook`: read the Stop-hook payload and log in a detached child.
///
/// Never fails the host session: every internal error is logged and the
/// process exits 0.
pub fn execute(source: Source) -> anyhow::Result<()> {
    if std::env::var_os(RUNNING_ENV).is_some() {
        return Ok(());
    }

    let mut stdin_buf = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut stdin_buf) {
        tracing::warn!(error = %e, "cannot read hook payload");
        return Ok(());
    }

    let input = match parse_hook_input(&stdin_buf) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring hook payload");
            return Ok(());
        }
    };
    if input.stop_hook_active {
        tracing::debug!(session_id = %input.session_id, "re-entrant stop, not logging");
        return Ok(());
    }

    let event = input.into_event(source, detect_machine(), detect_tmux());
    if let Err(e) = spawn_detached(&event) {
        tracing::warn!(session_id = %event.session_id, error = %e, "cannot start background log");
    }
    Ok(())
}

/// Arguments of the `sesslog log` child for an event.
fn log_args(event: &SessionEvent) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "log".into(),
        "--source".into(),
        event.source.as_str().into(),
        "--session-id".into(),
        event.session_id.clone().into(),
        "--transcript".into(),
        event.transcript_path.clone().into(),
        "--cwd".into(),
        event.cwd.clone().into(),
        "--machine".into(),
        event.machine.clone().into(),
    ];
    if let Some(tmux) = event.tmux_label() {
        args.push("--tmux".into());
        args.push(tmux.into());
    }
    args
}

fn spawn_detached(event: &SessionEvent) -> anyhow::Result<()> {
    let paths = Settings::load()?.store_paths();
    paths.ensure_layout()?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)?;

    let mut cmd = Command::new(std::env::current_exe()?);
    cmd.args(log_args(event))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(log)
        .env("SESSLOG_HOME", &paths.root);
    detach(&mut cmd);
    let child = cmd.spawn()?;
    tracing::debug!(pid = child.id(), session_id = %event.session_id, "spawned background log");
    Ok(())
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Own process group: the child outlives the hook's group being torn down.
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

/// `session:window` of the enclosing tmux session, if any.
fn detect_tmux() -> Option<String> {
    std::env::var_os("TMUX")?;
    let out = Command::new("tmux")
        .args(["display-message", "-p", "#S:#I"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let label = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!label.is_empty()).then_some(label)
}
