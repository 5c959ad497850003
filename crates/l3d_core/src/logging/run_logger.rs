//! Log file for a single calibration run.
//!
//! Lines go to `<log_dir>/<run_name>.log` and to an optional callback.
//! Detection lines are also kept in a bounded tail that is dumped when a run
//! fails, so a compact log still shows what the detector saw last.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LineKind, LogCallback, LogConfig};

struct Sink {
    writer: Option<BufWriter<File>>,
    tail: VecDeque<String>,
    /// Last percentage written while compact.
    last_percent: Option<u32>,
    warnings: usize,
}

pub struct RunLogger {
    run_name: String,
    log_path: PathBuf,
    config: LogConfig,
    callback: Option<LogCallback>,
    sink: Mutex<Sink>,
}

impl RunLogger {
    /// Create the log file (and `log_dir`) and write the header line.
    pub fn create(
        run_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> io::Result<Self> {
        let run_name = run_name.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", file_stem(&run_name)));
        let mut writer = BufWriter::new(File::create(&log_path)?);
        writeln!(writer, "# {} started {}", run_name, Local::now().to_rfc3339())?;

        Ok(Self {
            run_name,
            log_path,
            sink: Mutex::new(Sink {
                writer: Some(writer),
                tail: VecDeque::with_capacity(config.tail_lines),
                last_percent: None,
                warnings: 0,
            }),
            config,
            callback,
        })
    }

    pub fn builder(run_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> RunLoggerBuilder {
        RunLoggerBuilder {
            run_name: run_name.into(),
            log_dir: log_dir.into(),
            config: LogConfig::default(),
            callback: None,
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn info(&self, message: &str) {
        self.line(LineKind::Plain, message);
    }

    pub fn phase(&self, name: &str) {
        self.line(LineKind::Phase, name);
    }

    /// Start of one camera's frame scan.
    pub fn camera(&self, name: &str) {
        self.line(LineKind::Camera, name);
    }

    pub fn warn(&self, message: &str) {
        self.sink.lock().warnings += 1;
        self.line(LineKind::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.line(LineKind::Failure, message);
    }

    pub fn success(&self, message: &str) {
        self.line(LineKind::Success, message);
    }

    /// One board detection. Always kept in the tail; written out unless
    /// compact.
    pub fn detection(&self, message: &str) {
        {
            let mut sink = self.sink.lock();
            if self.config.tail_lines > 0 {
                if sink.tail.len() == self.config.tail_lines {
                    sink.tail.pop_front();
                }
                sink.tail.push_back(message.to_string());
            }
        }
        if !self.config.compact {
            self.line(LineKind::Detection, message);
        }
    }

    /// Frames scanned so far. Returns whether a line was written.
    pub fn frame_progress(&self, completed: u64, total: u64) -> bool {
        let percent = if total == 0 {
            100
        } else {
            (completed.min(total) * 100 / total) as u32
        };

        if self.config.compact {
            let step = self.config.progress_step.max(1);
            let mut sink = self.sink.lock();
            let due = match sink.last_percent {
                None => true,
                Some(prev) => percent / step > prev / step || (percent == 100 && prev < 100),
            };
            if !due {
                return false;
            }
            sink.last_percent = Some(percent);
        }

        self.line(
            LineKind::Progress,
            &format!("{}/{} frames ({}%)", completed, total, percent),
        );
        true
    }

    /// Write the retained detection lines under a heading.
    pub fn dump_tail(&self, heading: &str) {
        let lines: Vec<String> = self.sink.lock().tail.iter().cloned().collect();
        if lines.is_empty() {
            return;
        }
        self.emit(&format!("last {} {}:", lines.len(), heading));
        for line in &lines {
            self.emit(&LineKind::Detection.render(line));
        }
    }

    pub fn tail(&self) -> Vec<String> {
        self.sink.lock().tail.iter().cloned().collect()
    }

    pub fn warnings(&self) -> usize {
        self.sink.lock().warnings
    }

    /// Flush and release the file. Later lines reach only the callback.
    pub fn close(&self) {
        if let Some(mut writer) = self.sink.lock().writer.take() {
            let _ = writer.flush();
        }
    }

    fn line(&self, kind: LineKind, message: &str) {
        if kind.level() < self.config.level {
            return;
        }
        self.emit(&kind.render(message));
    }

    fn emit(&self, text: &str) {
        let text = if self.config.timestamps {
            format!("{} {}", Local::now().format("%H:%M:%S%.3f"), text)
        } else {
            text.to_string()
        };

        if let Some(writer) = self.sink.lock().writer.as_mut() {
            let _ = writeln!(writer, "{}", text);
        }
        if let Some(callback) = &self.callback {
            callback(&text);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

fn file_stem(run_name: &str) -> String {
    run_name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

pub struct RunLoggerBuilder {
    run_name: String,
    log_dir: PathBuf,
    config: LogConfig,
    callback: Option<LogCallback>,
}

impl RunLoggerBuilder {
    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.config.compact = compact;
        self
    }

    pub fn callback(mut self, callback: LogCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn build(self) -> io::Result<RunLogger> {
        RunLogger::create(self.run_name, self.log_dir, self.config, self.callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn quiet() -> LogConfig {
        LogConfig {
            timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn file_starts_with_header_and_keeps_markers() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::create("calibration_20260501", dir.path(), quiet(), None).unwrap();
        logger.phase("Detecting");
        logger.camera("camA");
        logger.close();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("# calibration_20260501 started "));
        assert_eq!(&lines[1..], &["== Detecting ==", "-- camA --"]);
    }

    #[test]
    fn callback_sees_lines_above_level() {
        let dir = tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = RunLogger::builder("run", dir.path())
            .config(quiet())
            .compact(false)
            .callback(Box::new(move |line: &str| sink.lock().push(line.to_string())))
            .build()
            .unwrap();

        logger.warn("camB has no detections");
        // Detection lines are debug level; the default config filters them
        logger.detection("camA frame 0: 24 corners");

        assert_eq!(*seen.lock(), vec!["WARN camB has no detections"]);
        assert_eq!(logger.warnings(), 1);
        assert_eq!(logger.tail(), vec!["camA frame 0: 24 corners"]);
    }

    #[test]
    fn compact_progress_is_thinned() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::create("run", dir.path(), quiet(), None).unwrap();

        assert!(logger.frame_progress(0, 50));
        assert!(!logger.frame_progress(5, 50));
        assert!(logger.frame_progress(10, 50));
        assert!(!logger.frame_progress(14, 50));
        assert!(logger.frame_progress(50, 50));
        assert!(!logger.frame_progress(50, 50));
    }

    #[test]
    fn tail_is_bounded_and_dumped() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            tail_lines: 2,
            ..quiet()
        };
        let logger = RunLogger::create("run", dir.path(), config, None).unwrap();
        for frame in 0..4 {
            logger.detection(&format!("camA frame {}", frame));
        }
        assert_eq!(logger.tail(), vec!["camA frame 2", "camA frame 3"]);

        logger.dump_tail("detections");
        logger.close();
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("last 2 detections:\n  camA frame 2\n  camA frame 3\n"));
    }

    #[test]
    fn run_names_become_safe_file_names() {
        assert_eq!(file_stem("cal/run:1 a"), "cal_run_1_a");
    }
}
