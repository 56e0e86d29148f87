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

//! Logging for the generator: a thin layer over the `log` facade with the
//! sinks a systemd generator can use (console and the kernel log buffer).
pub mod logger;

/// reexport log::Log
pub use log::{debug, error, info, trace, warn};
pub use log::{max_level, set_max_level};
pub use log::{Level, LevelFilter, Log, Metadata, Record};

pub use logger::init_log;

/// Initialize console logger.
pub fn init_log_to_console(name: &str, level: crate::Level) {
    init_log(name, level, vec!["console"]);
}

/// Initialize kmsg logger.
pub fn init_log_to_kmsg(name: &str, level: crate::Level) {
    init_log(name, level, vec!["kmsg"]);
}

/// Parse a level name as used in configuration files.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "error" | "err" => Some(Level::Error),
        "warn" | "warning" => Some(Level::Warn),
        "info" | "notice" => Some(Level::Info),
        "debug" => Some(Level::Debug),
        "trace" => Some(Level::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info"), Some(Level::Info));
        assert_eq!(parse_level(" Debug "), Some(Level::Debug));
        assert_eq!(parse_level("warning"), Some(Level::Warn));
        assert_eq!(parse_level("loud"), None);
    }
}
