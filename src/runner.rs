use crate::config::Settings;
use crate::error::{BuilderError, Result};
use makefile_parser::{MakefileInfo, parse_makefile};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 1 << 13;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exactly one `Makefile` or `makefile` in `dir`.
pub fn find_makefile(dir: &Path) -> Result<PathBuf> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if (name == "Makefile" || name == "makefile") && entry.path().is_file() {
            matches.push(entry.path());
        }
    }
    match matches.len() {
        0 => Err(BuilderError::NoMakefile(dir.to_path_buf())),
        1 => Ok(matches.remove(0)),
        _ => Err(BuilderError::AmbiguousMakefile(dir.to_path_buf())),
    }
}

/// Targets of the Makefile in `dir`, with `$(VAR)` references expanded.
pub fn load_targets(dir: &Path) -> Result<MakefileInfo> {
    let path = find_makefile(dir)?;
    let content = fs::read_to_string(&path)?;
    let info = parse_makefile(&content);
    debug!("{} targets in {}", info.targets.len(), path.display());
    Ok(info)
}

/// Where build output goes.
pub trait OutputSink: Send + 'static {
    fn write(&mut self, text: &str);
}

pub struct TerminalSink;

impl OutputSink for TerminalSink {
    fn write(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Keeps everything in memory; clones share the buffer.
#[derive(Clone, Default)]
pub struct CollectSink(Arc<Mutex<String>>);

impl CollectSink {
    pub fn contents(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl OutputSink for CollectSink {
    fn write(&mut self, text: &str) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push_str(text);
    }
}

/// Incremental UTF-8 decoding; a character split across reads is held back.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
    reported: bool,
}

impl Utf8Decoder {
    fn decode(&mut self, data: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);

        let mut out = String::new();
        let mut rest: &[u8] = &buf;
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        None => {
                            self.pending = after.to_vec();
                            rest = &[];
                        }
                        Some(len) => {
                            self.report(&mut out, &e);
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                    }
                }
            }
        }
        out
    }

    /// Whatever is left at EOF is an incomplete sequence.
    fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        let mut out = String::new();
        if let Err(e) = std::str::from_utf8(&pending) {
            self.report(&mut out, &e);
        }
        out.push_str(&String::from_utf8_lossy(&pending));
        out
    }

    fn report(&mut self, out: &mut String, e: &std::str::Utf8Error) {
        if !self.reported {
            self.reported = true;
            out.push_str(&format!("Error decoding output using utf-8 - {e}\n"));
        }
    }
}

/// Drains the combined stdout/stderr pipe into `sink`; returns whether output ended on a newline.
fn read_handle<R: Read>(mut handle: R, sink: &mut dyn OutputSink) -> bool {
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut at_line_start = true;
    let mut emit = |text: String, sink: &mut dyn OutputSink| {
        if !text.is_empty() {
            at_line_start = text.ends_with('\n');
            sink.write(&text);
        }
    };
    loop {
        let n = match handle.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Output pipe closed: {}", e);
                break;
            }
        };
        emit(decoder.decode(&buf[..n]), &mut *sink);
    }
    emit(decoder.finish(), &mut *sink);
    at_line_start
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub status: Option<ExitStatus>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        !self.cancelled && self.status.is_some_and(|s| s.success())
    }

    /// `Err` for cancelled or failed builds.
    pub fn check(&self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(BuilderError::BuildFailed(self.summary()))
        }
    }

    fn summary(&self) -> String {
        if self.cancelled {
            return "[Cancelled]".to_string();
        }
        let secs = self.elapsed.as_secs_f64();
        match self.status.and_then(|s| s.code()) {
            Some(code) if code != 0 => format!("[Finished in {secs:.2}s with exit code {code}]"),
            _ => format!("[Finished in {secs:.2}s]"),
        }
    }
}

struct Build {
    child: Arc<Mutex<Child>>,
    cancelled: Arc<AtomicBool>,
    own_group: bool,
    writer: JoinHandle<BuildOutcome>,
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Build {
    fn cancel(&self) {
        let mut child = lock(&self.child);
        if let Ok(None) = child.try_wait() {
            self.cancelled.store(true, Ordering::SeqCst);
            if let Err(e) = self.terminate(&mut child) {
                warn!("Failed to stop build process: {}", e);
            }
        }
    }

    /// make 启动的 recipe shell 也持有输出管道，需要对整个进程组发信号
    #[cfg(unix)]
    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if !self.own_group {
            return child.kill();
        }
        let pgid = i32::try_from(child.id()).map_err(io::Error::other)?;
        killpg(Pid::from_raw(pgid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        child.kill()
    }

    fn is_running(&self) -> bool {
        matches!(lock(&self.child).try_wait(), Ok(None))
    }

    fn join(self) -> Result<BuildOutcome> {
        self.writer
            .join()
            .map_err(|_| BuilderError::Io(io::Error::other("build output thread panicked")))
    }
}

/// Runs `make <target>` and streams its output; one build at a time.
pub struct Runner {
    working_dir: PathBuf,
    program: String,
    args: Vec<String>,
    own_group: bool,
    current: Option<Build>,
}

impl Runner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Runner {
            working_dir: working_dir.into(),
            program: "make".to_string(),
            args: vec![],
            own_group: true,
            current: None,
        }
    }

    /// Replaces `make`; the target is appended after `args`.
    pub fn with_program(mut self, program: impl Into<String>, args: &[&str]) -> Self {
        self.program = program.into();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Keeps the build in the caller's process group so a terminal Ctrl-C reaches it.
    /// `cancel` then only stops `make` itself.
    pub fn inherit_process_group(mut self) -> Self {
        self.own_group = false;
        self
    }

    /// 启动构建，之前仍在运行的构建会被终止
    pub fn start<S: OutputSink>(&mut self, target: &str, mut sink: S) -> Result<()> {
        if let Some(previous) = self.current.take() {
            previous.cancel();
            previous.join()?;
        }

        let started = Instant::now();
        // stdout 和 stderr 共用一个管道，保持输出顺序
        let (reader, writer) = os_pipe::pipe()?;
        let child = {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args)
                .arg(target)
                .current_dir(&self.working_dir)
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            #[cfg(unix)]
            if self.own_group {
                use std::os::unix::process::CommandExt;
                cmd.process_group(0);
            }
            // `cmd` holds the write ends until it is dropped at the end of this block
            cmd.spawn().map_err(|source| BuilderError::Spawn {
                program: self.program.clone(),
                source,
            })?
        };
        info!("Running {} {} in {}", self.program, target, self.working_dir.display());

        let child = Arc::new(Mutex::new(child));
        let cancelled = Arc::new(AtomicBool::new(false));

        let writer = {
            let child = Arc::clone(&child);
            let cancelled = Arc::clone(&cancelled);
            thread::spawn(move || {
                let at_line_start = read_handle(reader, &mut sink);

                let status = loop {
                    match lock(&child).try_wait() {
                        Ok(Some(status)) => break Some(status),
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Failed to wait for build process: {}", e);
                            break None;
                        }
                    }
                    thread::sleep(POLL_INTERVAL);
                };

                let outcome = BuildOutcome {
                    status,
                    elapsed: started.elapsed(),
                    cancelled: cancelled.load(Ordering::SeqCst),
                };
                if !at_line_start {
                    sink.write("\n");
                }
                sink.write(&format!("{}\n", outcome.summary()));
                outcome
            })
        };

        self.current = Some(Build {
            child,
            cancelled,
            own_group: self.own_group,
            writer,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(Build::is_running)
    }

    pub fn cancel(&self) {
        if let Some(build) = &self.current {
            build.cancel();
        }
    }

    /// Blocks until the current build's output is drained.
    pub fn wait(&mut self) -> Result<Option<BuildOutcome>> {
        match self.current.take() {
            Some(build) => build.join().map(Some),
            None => Ok(None),
        }
    }
}

/// Starts `make <target>` inside the configured terminal emulator and returns.
pub fn launch_in_terminal(settings: &Settings, dir: &Path, target: &str) -> Result<()> {
    Command::new(&settings.terminal_emu)
        .args(&settings.terminal_opts)
        .arg("make")
        .arg(target)
        .current_dir(dir)
        .spawn()
        .map_err(|source| BuilderError::Spawn {
            program: settings.terminal_emu.clone(),
            source,
        })?;
    info!("Launched make {} in {}", target, settings.terminal_emu);
    Ok(())
}
