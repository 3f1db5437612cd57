//! 启动前环境准备
//!
//! 在任何服务和日志系统触碰共享资源之前切换工作目录。
//! 工作目录是进程级别的状态，整个进程内最多切换一次。

use crate::error::{Result, WorkerError};
use std::path::Path;
use std::sync::Mutex;

/// 进程内是否已经切换过工作目录
static WORKDIR_APPLIED: Mutex<bool> = Mutex::new(false);

/// 切换到 `workdir`，返回是否真的切换了目录
///
/// 当前目录与目标相同时不做任何事。第一次成功切换后，之后的调用不再改变目录。
/// 失败时日志系统还不存在，错误直接写到标准错误。
pub fn prepare_environment(workdir: &Path) -> Result<bool> {
    apply_workdir(&WORKDIR_APPLIED, workdir)
}

fn apply_workdir(latch: &Mutex<bool>, target: &Path) -> Result<bool> {
    let mut applied = latch.lock().unwrap_or_else(|p| p.into_inner());
    if *applied {
        return Ok(false);
    }

    let result = change_dir_if_needed(target);
    match result {
        Ok(changed) => {
            *applied |= changed;
            Ok(changed)
        }
        Err(e) => {
            eprintln!("{}", e);
            Err(e)
        }
    }
}

fn change_dir_if_needed(target: &Path) -> Result<bool> {
    let prep_error = |source| WorkerError::EnvironmentPrep {
        path: target.to_path_buf(),
        source,
    };

    let current = std::env::current_dir().map_err(prep_error)?;
    if same_dir(&current, target) {
        return Ok(false);
    }

    std::env::set_current_dir(target).map_err(prep_error)?;
    Ok(true)
}

/// 比较两个目录，能解析符号链接时按真实路径比较
fn same_dir(current: &Path, target: &Path) -> bool {
    if current == target {
        return true;
    }
    match (current.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
