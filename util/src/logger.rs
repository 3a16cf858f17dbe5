// Copyright (c) 2020 Huawei Technologies Co.,Ltd. All rights reserved.
//
// StratoVirt is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::{Level, Log, Metadata, Record};

/// Format a record as "[file: line]:LEVEL: message".
fn format_record(record: &Record) -> String {
    format!(
        "[{}: {}]:{}: {}\n",
        record.file().unwrap_or(""),
        record.line().unwrap_or(0),
        record.level(),
        record.args()
    )
}

/// Logger used while generating ACPI tables, writes to stderr or a log file.
struct TableLogger {
    handler: Mutex<Box<dyn Write + Send>>,
    level: Level,
}

impl Log for TableLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatmsg = format_record(record);
        let mut handler = match self.handler.lock() {
            Ok(h) => h,
            Err(e) => e.into_inner(),
        };
        if let Err(e) = handler.write_all(formatmsg.as_bytes()) {
            eprintln!("Failed to log message {:?}", e);
        }
    }

    fn flush(&self) {
        if let Ok(mut handler) = self.handler.lock() {
            let _ = handler.flush();
        }
    }
}

fn open_log_file(path: &str) -> Result<File> {
    std::fs::OpenOptions::new()
        .read(false)
        .write(true)
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path))
}

/// Install the global logger.
///
/// # Arguments
///
/// * `path` - Log file to append to, an empty string means stderr.
/// * `level` - Most verbose level that is emitted.
pub fn init_log(path: &str, level: Level) -> Result<()> {
    let logfile: Box<dyn Write + Send> = if path.is_empty() {
        Box::new(std::io::stderr())
    } else {
        Box::new(open_log_file(path)?)
    };

    let logger = TableLogger {
        handler: Mutex::new(logfile),
        level,
    };
    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level.to_level_filter()))
        .with_context(|| format!("Failed to init logger: {}", path))
}
