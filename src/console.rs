//! 终端输出模块
//!
//! 标准输出/标准错误的共享句柄。横幅、提示符和进度指示器都通过这里写入，
//! 同一时刻只有一个写入者持有输出流。

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 可共享的输出流
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// 终端输出
#[derive(Clone)]
pub struct Console {
    stdout: SharedWriter,
    stderr: SharedWriter,
    quiet: bool,
    terminal: bool,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("quiet", &self.quiet)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl Console {
    /// 使用进程的标准输出和标准错误
    pub fn stdio(quiet: bool) -> Self {
        Self {
            terminal: io::stdout().is_terminal(),
            stdout: Arc::new(Mutex::new(Box::new(io::stdout()))),
            stderr: Arc::new(Mutex::new(Box::new(io::stderr()))),
            quiet,
        }
    }

    /// 使用自定义输出流，视为非终端
    pub fn with_writers(
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
        quiet: bool,
    ) -> Self {
        Self {
            stdout: Arc::new(Mutex::new(stdout)),
            stderr: Arc::new(Mutex::new(stderr)),
            quiet,
            terminal: false,
        }
    }

    /// 替换标准输出
    pub fn set_stdout(&mut self, stdout: Box<dyn Write + Send>) {
        self.stdout = Arc::new(Mutex::new(stdout));
        self.terminal = false;
    }

    /// 替换标准错误
    pub fn set_stderr(&mut self, stderr: Box<dyn Write + Send>) {
        self.stderr = Arc::new(Mutex::new(stderr));
    }

    /// 是否处于安静模式
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// 标准输出是否连接到终端
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// 输出一行到标准输出（安静模式下不输出）
    pub fn say(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut out = self.lock_stdout();
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }

    /// 输出到标准输出，不换行
    pub fn say_raw(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut out = self.lock_stdout();
        let _ = write!(out, "{message}");
        let _ = out.flush();
    }

    /// 输出一行到标准错误（安静模式下同样输出）
    pub fn carp(&self, message: &str) {
        let mut err = lock(&self.stderr);
        let _ = writeln!(err, "{message}");
        let _ = err.flush();
    }

    /// 获取标准输出的独占写入权
    pub fn lock_stdout(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        lock(&self.stdout)
    }

    /// 标准输出句柄
    pub fn stdout(&self) -> SharedWriter {
        self.stdout.clone()
    }

    /// 标准错误句柄
    pub fn stderr(&self) -> SharedWriter {
        self.stderr.clone()
    }
}

/// 把共享输出流当作 tracing 的输出目标
///
/// 每次写入都重新获取锁，和横幅、提示符的写入互斥。
#[derive(Clone)]
pub struct StreamWriter {
    inner: SharedWriter,
}

impl StreamWriter {
    pub fn new(inner: SharedWriter) -> Self {
        Self { inner }
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.inner).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        lock(&self.inner).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.inner).flush()
    }
}

impl<'a> MakeWriter<'a> for StreamWriter {
    type Writer = StreamWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn lock(writer: &SharedWriter) -> MutexGuard<'_, Box<dyn Write + Send>> {
    writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 内存输出缓冲，用于捕获输出
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    /// 创建空缓冲
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的内容
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
