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

//! quadlet-generator

use clap::Parser;
use log::Level;
use quadlet::config::GeneratorConfig;
use quadlet::generator::{unit_search_dirs, Generator, GeneratorOptions};
use std::path::{Path, PathBuf};

const GENERATOR_NAME: &str = "quadlet-generator";
const USER_GENERATOR_SUFFIX: &str = "-user-generator";
const DEFAULT_OUTPUT_DIR: &str = "/tmp";

/// generate systemd services and their install links from quadlet files
#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
    /// generate user units
    #[clap(long, value_parser)]
    user: bool,
    /// print the generated units instead of writing them
    #[clap(long, value_parser)]
    dryrun: bool,
    /// log to the console instead of /dev/kmsg
    #[clap(long = "no-kmsg-log", value_parser)]
    no_kmsg_log: bool,
    /// enable debug logging
    #[clap(short, long, value_parser)]
    verbose: bool,
    /// configuration file
    #[clap(long, value_parser)]
    config: Option<String>,
    /// normal, early and late output directories, only the first is written
    #[clap(value_parser, max_values = 3)]
    dirs: Vec<PathBuf>,
}

/// installed as `<name>-user-generator` it runs for the user manager
fn invoked_as_user_generator() -> bool {
    std::env::args()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(USER_GENERATOR_SUFFIX))
        })
        .unwrap_or(false)
}

fn main() {
    let args = Args::parse();
    let config = GeneratorConfig::new(args.config.as_deref());

    let level = if args.verbose {
        Level::Debug
    } else {
        config.log_level()
    };
    if args.no_kmsg_log || args.dryrun {
        log::init_log_to_console(GENERATOR_NAME, level);
    } else {
        log::init_log_to_kmsg(GENERATOR_NAME, level);
    }

    let output_dir = match args.dirs.first() {
        Some(dir) => dir.clone(),
        None if args.dryrun => PathBuf::from(DEFAULT_OUTPUT_DIR),
        None => {
            log::error!("Missing output directory argument");
            std::process::exit(1);
        }
    };

    let user = args.user || invoked_as_user_generator();
    let options = GeneratorOptions {
        user,
        dry_run: args.dryrun,
        jobs: config.jobs(),
        manifest_dir: config.manifest_dir().to_string(),
        unit_dirs: unit_search_dirs(user, config.unit_dirs()),
    };
    log::debug!(
        "Generating into {:?} with {} jobs from {:?}",
        output_dir,
        options.jobs,
        options.unit_dirs
    );

    let summary = Generator::new(&output_dir, options).run();
    if !summary.success() {
        std::process::exit(1);
    }
}
