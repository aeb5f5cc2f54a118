//! Dual stdout/log-file logging (spec §7): every message goes to stdout;
//! when `-log` names a file, messages are duplicated there too, and a
//! freshly created log file starts with a UTF-8 BOM so editors that sniff
//! encoding don't misread it as Latin-1.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{Level, Log, Metadata, Record};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct DualLogger {
    level: Level,
    file: Option<Mutex<std::fs::File>>,
}

impl DualLogger {
    pub fn init(level: Level, log_path: Option<&Path>) -> std::io::Result<()> {
        let file = match log_path {
            Some(path) => {
                let is_new = !path.exists();
                let mut f = OpenOptions::new().create(true).append(true).open(path)?;
                if is_new {
                    f.write_all(UTF8_BOM)?;
                }
                Some(Mutex::new(f))
            }
            None => None,
        };
        let logger = DualLogger { level, file };
        log::set_max_level(level.to_level_filter());
        log::set_boxed_logger(Box::new(logger)).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{}: {}", record.level(), record.args());
        println!("{line}");
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{line}");
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn new_log_file_starts_with_bom() {
        let path = std::env::temp_dir().join("opi_cli_logging_test.log");
        let _ = fs::remove_file(&path);
        {
            let is_new = !path.exists();
            let mut f = OpenOptions::new().create(true).append(true).open(&path).unwrap();
            if is_new {
                f.write_all(UTF8_BOM).unwrap();
            }
            writeln!(f, "hello").unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        fs::remove_file(&path).ok();
    }
}
