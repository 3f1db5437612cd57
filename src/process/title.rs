//! 进程标题
//!
//! 尽力而为：不支持或失败时静默忽略。

/// 进程标题前缀
pub const PROCESS_IDENT: &str = "[worker]";

/// Linux 进程名的最大字节数，不含结尾的 NUL
pub const COMM_MAX_LEN: usize = 15;

/// 设置进程标题为 `<PROCESS_IDENT> <stage>`
pub fn set_process_title(stage: &str) {
    let title = format_title(PROCESS_IDENT, stage);
    apply(truncate_title(&title));
}

/// 拼接进程标题
pub fn format_title(ident: &str, stage: &str) -> String {
    format!("{ident} {stage}")
}

/// 截断到 [`COMM_MAX_LEN`] 字节以内，保持字符边界
pub fn truncate_title(title: &str) -> &str {
    if title.len() <= COMM_MAX_LEN {
        return title;
    }
    let mut end = COMM_MAX_LEN;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    &title[..end]
}

/// 写 `/proc/self/comm` 修改的是主线程也就是进程本身的名字，
/// 与调用方所在的线程无关。写入失败时退回到只修改当前线程的 `PR_SET_NAME`。
#[cfg(target_os = "linux")]
fn apply(title: &str) {
    let title = title.replace('\0', "");
    if std::fs::write("/proc/self/comm", title.as_bytes()).is_ok() {
        return;
    }

    let mut bytes = title.into_bytes();
    bytes.push(0);
    unsafe {
        libc::prctl(libc::PR_SET_NAME, bytes.as_ptr() as libc::c_ulong, 0, 0, 0);
    }
}

#[cfg(not(target_os = "linux"))]
fn apply(_title: &str) {}
