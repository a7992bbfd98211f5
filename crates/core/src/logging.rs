//! Centralized logging for the emulation core.
//!
//! A single global [`LogConfig`] holds an atomic log level per category so
//! that the hot emulation loop can check "is this enabled?" without taking a
//! lock. Messages are built lazily through closures and are only formatted
//! when the category/level combination is live.
//!
//! Output goes to stderr by default; [`LogConfig::set_log_file`] redirects it
//! to a background writer thread so file I/O never stalls emulation.
//!
//! ```rust
//! use vcs_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("BRK at PC={:04X}", 0x1234)
//! });
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Instant;

/// Verbosity, ordered: Off < Error < Warn < Info < Debug < Trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a level from a CLI-style string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Subsystems that can be logged independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// 6507 instruction execution
    Cpu,
    /// Memory bus / address decoding
    Bus,
    /// TIA video and timing
    Tia,
    /// RIOT timer and ports
    Riot,
    /// Cartridge mapper activity
    Cart,
    /// Television signal / frame events
    Tv,
    /// Unimplemented features
    Stubs,
}

const CATEGORY_COUNT: usize = 7;

fn category_index(category: LogCategory) -> usize {
    match category {
        LogCategory::Cpu => 0,
        LogCategory::Bus => 1,
        LogCategory::Tia => 2,
        LogCategory::Riot => 3,
        LogCategory::Cart => 4,
        LogCategory::Tv => 5,
        LogCategory::Stubs => 6,
    }
}

/// Per-category output throttle. The TIA produces a message candidate three
/// times per CPU cycle so an unthrottled trace level would swamp the
/// terminal; anything over the per-second budget is counted and reported in
/// a summary line once the window rolls over.
struct Throttle {
    max_per_second: AtomicUsize,
    state: Mutex<[ThrottleWindow; CATEGORY_COUNT]>,
}

#[derive(Clone, Copy)]
struct ThrottleWindow {
    window_start: Option<Instant>,
    emitted: usize,
    dropped: usize,
}

impl Throttle {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            state: Mutex::new(
                [ThrottleWindow {
                    window_start: None,
                    emitted: 0,
                    dropped: 0,
                }; CATEGORY_COUNT],
            ),
        }
    }

    /// Returns whether this message may be emitted, plus the number of
    /// messages dropped since the last report (if any are due).
    fn admit(&self, category: LogCategory) -> (bool, usize) {
        let now = Instant::now();
        let max = self.max_per_second.load(Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        let w = &mut state[category_index(category)];

        let expired = match w.window_start {
            None => true,
            Some(start) => now.duration_since(start).as_secs() >= 1,
        };
        if expired {
            let dropped = w.dropped;
            *w = ThrottleWindow {
                window_start: Some(now),
                emitted: 1,
                dropped: 0,
            };
            return (true, dropped);
        }

        if w.emitted < max {
            w.emitted += 1;
            (true, 0)
        } else {
            w.dropped += 1;
            (false, 0)
        }
    }
}

/// Global logging configuration.
pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    sender: Mutex<Option<Sender<String>>>,
    file_enabled: AtomicBool,
    throttle: Throttle,
}

impl LogConfig {
    fn new() -> Self {
        const OFF: AtomicU8 = AtomicU8::new(0);
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: [OFF; CATEGORY_COUNT],
            sender: Mutex::new(None),
            file_enabled: AtomicBool::new(false),
            throttle: Throttle::new(60),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category_index(category)].store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category_index(category)].load(Ordering::Relaxed))
    }

    /// A category-specific level overrides the global level; a category left
    /// at Off falls back to the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.global_level()
        }
    }

    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for l in &self.category_levels {
            l.store(LogLevel::Off as u8, Ordering::Relaxed);
        }
    }

    pub fn set_throttle(&self, max_per_second: usize) {
        self.throttle
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    /// Redirect output to `path`, appending. Spawns the writer thread.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = rx.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        *self.sender.lock().unwrap() = Some(tx);
        self.file_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop logging to file; subsequent messages go to stderr.
    pub fn clear_log_file(&self) {
        *self.sender.lock().unwrap() = None;
        self.file_enabled.store(false, Ordering::Relaxed);
    }

    fn emit(&self, message: &str) {
        if self.file_enabled.load(Ordering::Relaxed) {
            let sender = self.sender.lock().unwrap();
            if let Some(tx) = sender.as_ref() {
                if tx.send(message.to_string()).is_ok() {
                    return;
                }
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message. The closure only runs when the category/level is enabled
/// and the throttle admits the message.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (admitted, dropped) = config.throttle.admit(category);
    if dropped > 0 {
        config.emit(&format!(
            "[{:?}] {} message(s) dropped by log throttle",
            category, dropped
        ));
    }
    if admitted {
        config.emit(&format!("[{:?}] {}", category, message_fn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("Info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("4"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Tia, LogLevel::Debug);

        assert!(config.should_log(LogCategory::Tia, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Bus, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Bus, LogLevel::Error));
    }

    #[test]
    fn test_global_fallback() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Warn);

        assert!(config.should_log(LogCategory::Cpu, LogLevel::Error));
        assert!(config.should_log(LogCategory::Cpu, LogLevel::Warn));
        assert!(!config.should_log(LogCategory::Cpu, LogLevel::Info));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Riot, LogLevel::Debug);

        config.reset();

        assert_eq!(config.global_level(), LogLevel::Off);
        assert_eq!(config.level(LogCategory::Riot), LogLevel::Off);
    }

    #[test]
    fn test_throttle_admits_within_budget() {
        let throttle = Throttle::new(10);
        for _ in 0..10 {
            let (admitted, _) = throttle.admit(LogCategory::Tia);
            assert!(admitted);
        }
        let (admitted, _) = throttle.admit(LogCategory::Tia);
        assert!(!admitted);
    }

    #[test]
    fn test_throttle_is_per_category() {
        let throttle = Throttle::new(5);
        for _ in 0..6 {
            throttle.admit(LogCategory::Cpu);
        }
        let (admitted, _) = throttle.admit(LogCategory::Riot);
        assert!(admitted);
    }
}
