// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//!
use log::{Level, Log};
use std::{
    fs::OpenOptions,
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

const KMSG_PATH: &str = "/dev/kmsg";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The loggers installed behind the `log` facade, swappable after the first
/// `init_log` call.
static LOGGERS: Mutex<Vec<Box<dyn Log>>> = Mutex::new(Vec::new());

fn write_msg_common(writer: &mut impl Write, module: &str, msg: String) {
    let time: libc::time_t = unsafe { libc::time(std::ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe { libc::localtime_r(&time, &mut tm) };
    let now_str = format!(
        "{:0>4}-{:0>2}-{:0>2} {:0>2}:{:0>2}:{:0>2} ",
        tm.tm_year + 1900, /* tm_year is years since 1900 */
        tm.tm_mon + 1,     /* tm_mon is months since Jan: [0, 11] */
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec
    );

    let line = format!("{}{} {}\n", now_str, module, msg);
    if let Err(e) = writer.write_all(line.as_bytes()) {
        eprintln!("Failed to log message: {}", e);
    }
}

/* syslog priority of a log level, as expected by /dev/kmsg */
fn level_to_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let mut stderr = std::io::stderr();
        let module_path = record.module_path().unwrap_or("unknown");
        write_msg_common(&mut stderr, module_path, record.args().to_string());
    }

    fn flush(&self) {}
}

/* Generators run before journald is up, the kernel buffer is the
 * only sink that is guaranteed to be collected. */
struct KmsgLogger {
    name: String,
    kmsg: Mutex<std::fs::File>,
}

impl KmsgLogger {
    fn new(name: &str) -> Result<Self, std::io::Error> {
        let kmsg = OpenOptions::new().write(true).open(KMSG_PATH)?;
        Ok(Self {
            name: name.to_string(),
            kmsg: Mutex::new(kmsg),
        })
    }
}

impl Log for KmsgLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let msg = format!(
            "<{}>{}[{}]: {}\n",
            level_to_priority(record.level()),
            self.name,
            std::process::id(),
            record.args()
        );

        let mut kmsg = match self.kmsg.lock() {
            Ok(v) => v,
            Err(_) => return,
        };
        /* kmsg rejects overlong records, nothing sensible to do then */
        let _ = kmsg.write_all(msg.as_bytes());
    }

    fn flush(&self) {}
}

/// Dispatches every record to the loggers currently in `LOGGERS`.
struct CombinedLogger;

impl Log for CombinedLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(loggers) = LOGGERS.lock() {
            for logger in loggers.iter() {
                logger.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Ok(loggers) = LOGGERS.lock() {
            for logger in loggers.iter() {
                logger.flush();
            }
        }
    }
}

/// Initialize the global static logger instance.
/// Available log `targets` include `console` and `kmsg`.
///
/// Repeated targets take effect only once. Calling it again replaces the
/// previous set of targets.
///
/// # Arguments
///
/// * `name` - The application name that initializes the logger, used as kmsg identifier.
/// * `level` - Log message level.
/// * `targets` - A set of log targets.
pub fn init_log(name: &str, level: Level, targets: Vec<&str>) {
    let mut seen: Vec<&str> = Vec::new();
    let mut loggers: Vec<Box<dyn Log>> = Vec::new();

    for target in targets {
        if seen.contains(&target) {
            continue;
        }
        seen.push(target);

        let logger = match target {
            "console" => Box::new(ConsoleLogger) as Box<dyn Log>,
            "kmsg" => match KmsgLogger::new(name) {
                Ok(logger) => Box::new(logger) as Box<dyn Log>,
                Err(e) => {
                    eprintln!("{} failed to open {}: {}", name, KMSG_PATH, e);
                    continue;
                }
            },
            _ => {
                eprintln!("{}: log target '{}' is strange, ignoring.", name, target);
                continue;
            }
        };

        loggers.push(logger);
    }

    if loggers.is_empty() {
        eprintln!("{}: no available log targets, falling back to console.", name);
        loggers.push(Box::new(ConsoleLogger));
    }

    match LOGGERS.lock() {
        Ok(mut v) => *v = loggers,
        Err(_) => {
            eprintln!("{}: failed to set global logger.", name);
            return;
        }
    }

    if !INITIALIZED.swap(true, Ordering::SeqCst) {
        static COMBINED: CombinedLogger = CombinedLogger;
        if let Err(e) = log::set_logger(&COMBINED) {
            eprintln!("{}: failed to set global logger: {}", name, e);
        }
    }

    log::set_max_level(level.to_level_filter());
}
