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

//! This crate provides common, functions for unit tests
use std::{
    io::{self, ErrorKind},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// get the path of a fixture below `<crate>/tests/fixtures`
pub fn get_fixture(crate_root: &Path, name: &str) -> io::Result<PathBuf> {
    let path = crate_root.join("tests").join("fixtures").join(name);
    if !path.exists() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            format!("fixture {} not found", path.display()),
        ));
    }
    Ok(path)
}

/// a fresh scratch directory, removed when the returned guard is dropped
pub fn scratch_dir() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("quadlet-test").tempdir()
}

/// every symlink below `root` as (relative link path, stored target), sorted
pub fn collect_symlinks(root: &Path) -> io::Result<Vec<(String, String)>> {
    let mut links = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        for entry in dir.read_dir()? {
            let entry = entry?;
            let path = entry.path();
            let ft = entry.file_type()?;
            if ft.is_dir() {
                dirs.push(path);
            } else if ft.is_symlink() {
                let rel = path.strip_prefix(root).unwrap_or(&path);
                links.push((
                    rel.to_string_lossy().to_string(),
                    path.read_link()?.to_string_lossy().to_string(),
                ));
            }
        }
    }

    links.sort();
    Ok(links)
}

/// plant a symlink, creating parent directories
pub fn plant_symlink(root: &Path, link: &str, target: &str) -> io::Result<()> {
    let path = root.join(link);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    symlink(target, path)
}
