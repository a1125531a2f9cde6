//! Braille spinner shown on stderr while a fetch runs.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const FRAME_DURATION: Duration = Duration::from_millis(80);

/// A spinner ticking on a background thread until stopped or dropped.
///
/// Does nothing when stderr is not a terminal.
pub struct Spinner {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(label: impl Into<String>) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        if !std::io::stderr().is_terminal() {
            return Self { done, handle: None };
        }

        let label = label.into();
        let flag = Arc::clone(&done);
        let handle = std::thread::spawn(move || {
            let mut frame = 0;
            while !flag.load(Ordering::Relaxed) {
                let mut err = std::io::stderr().lock();
                let _ = write!(err, "\r{} {label}", FRAMES[frame % FRAMES.len()]);
                let _ = err.flush();
                drop(err);
                frame += 1;
                std::thread::sleep(FRAME_DURATION);
            }
            let _ = write!(std::io::stderr(), "\r\x1b[K");
        });
        Self {
            done,
            handle: Some(handle),
        }
    }

    /// Stop ticking and erase the spinner line.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.finish();
    }
}
