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

//! the utils of the path operation
use crate::error::*;
use crate::TMP_PREFIX;
use nix::{
    errno::Errno,
    fcntl::renameat,
    unistd::{symlinkat, unlinkat, UnlinkatFlags},
};
use rand::Rng;
use std::fs::{create_dir_all, remove_dir, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const TMP_NAME_ATTEMPTS: u32 = 16;

/// What lstat(2) found at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// nothing there
    Missing,
    /// a symlink, with the target it stores
    Symlink(PathBuf),
    /// a directory
    Directory,
    /// regular file, fifo, socket or device node
    Other,
}

/// Classify the entry at `path` without following symlinks.
pub fn file_kind(path: &Path) -> Result<FileKind> {
    let md = match path.symlink_metadata() {
        Ok(md) => md,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileKind::Missing),
        Err(e) => return Err(Error::Io { source: e }),
    };

    let ft = md.file_type();
    if ft.is_symlink() {
        return match path.read_link() {
            Ok(target) => Ok(FileKind::Symlink(target)),
            /* removed between lstat and readlink */
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileKind::Missing),
            Err(e) => Err(Error::Io { source: e }),
        };
    }

    if ft.is_dir() {
        return Ok(FileKind::Directory);
    }

    Ok(FileKind::Other)
}

/// Replace unstable is_symlink method in std
pub fn is_symlink(path: &Path) -> bool {
    let md = match path.symlink_metadata() {
        Ok(md) => md,
        Err(_) => return false,
    };

    md.file_type().is_symlink()
}

/// build a hidden, randomized sibling name for `path`
fn tmp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or(Error::Invalid {
        what: format!("{} has no file name", path.to_string_lossy()),
    })?;

    let tmp = format!(
        "{}{}.{:08x}",
        TMP_PREFIX,
        name.to_string_lossy(),
        rand::thread_rng().gen::<u32>()
    );
    Ok(path.with_file_name(tmp))
}

/// create symlink link -> target, atomically replacing whatever is at `link`
/* Take "A -> B" for example, A is "link", B is "target".
 * The link is created under a temporary name and renamed over the final
 * path, so readers observe either the old entry or the new one. */
pub fn symlink_atomic(target: &Path, link: &Path) -> Result<()> {
    let mut attempts = 0;
    let tmp_link = loop {
        let tmp_link = tmp_sibling(link)?;
        match symlinkat(target, None, tmp_link.as_path()) {
            Ok(()) => break tmp_link,
            Err(Errno::EEXIST) if attempts < TMP_NAME_ATTEMPTS => attempts += 1,
            Err(e) => {
                log::error!(
                    "Failed to create symlink {:?} -> {:?}: {}",
                    link,
                    target,
                    e
                );
                return Err(Error::Nix { source: e });
            }
        }
    };

    if let Err(e) = renameat(None, tmp_link.as_path(), None, link) {
        log::error!(
            "Failed to rename the temporary path of {:?}: {}",
            link,
            e
        );
        let _ = unlinkat(None, tmp_link.as_path(), UnlinkatFlags::NoRemoveDir);
        return Err(Error::Nix { source: e });
    }

    log::debug!("Successfully created symlink: {:?} -> {:?}", link, target);

    Ok(())
}

/// write `contents` to `path` through a temporary file and rename(2)
pub fn write_file_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut attempts = 0;
    let (mut file, tmp_path) = loop {
        let tmp_path = tmp_sibling(path)?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&tmp_path)
        {
            Ok(f) => break (f, tmp_path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempts < TMP_NAME_ATTEMPTS => {
                attempts += 1
            }
            Err(e) => return Err(Error::Io { source: e }),
        }
    };

    let written = file
        .write_all(contents)
        .and_then(|_| file.sync_all())
        .and_then(|_| std::fs::rename(&tmp_path, path));
    if let Err(e) = written {
        log::error!("Failed to write {:?}: {}", path, e);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io { source: e });
    }

    Ok(())
}

/// create the parent directories of path, existing ones are fine
pub fn mkdir_parents(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };

    create_dir_all(parent).context(IoSnafu)
}

/// remove the file or symlink at path, return false if it was already gone
pub fn unlink_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io { source: e }),
    }
}

/// recursively remove empty directories from `dir` upwards, `stop` itself is kept
pub fn remove_dir_until(dir: &Path, stop: &Path) -> Result<()> {
    let mut dir = dir;

    while dir != stop && dir.starts_with(stop) {
        if let Err(e) = remove_dir(dir) {
            match e.raw_os_error().map(Errno::from_i32) {
                Some(Errno::ENOTEMPTY) | Some(Errno::EEXIST) => break,
                Some(Errno::ENOENT) => {}
                _ => return Err(Error::Io { source: e }),
            }
        }

        dir = match dir.parent() {
            Some(p) => p,
            None => break,
        };
    }

    Ok(())
}

/// check if the path name contains unsafe character
///
/// return true if it doesn't contain unsafe character
pub fn path_name_is_safe(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    !s.chars().any(|c| c.is_control())
}
