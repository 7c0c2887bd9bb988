//! 会话日志 - 只追加的 CSV 游戏时长记录
//!
//! 文件首次创建时写入表头，之后每个结束的会话追加一行。

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{debug, warn};

use super::SessionLogRecord;
use crate::error::{Error, Result};

/// CSV 表头
pub const LOG_HEADER: [&str; 4] = ["Game", "Start", "End", "Time Played"];

const LINE_TERMINATOR: &str = "\r\n";

/// 会话日志写入器
pub struct SessionRecorder {
    path: PathBuf,
    /// 进程内写入互斥，跨进程由文件锁保证
    write_lock: Mutex<()>,
}

impl SessionRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录，失败时重试一次
    pub fn append(&self, record: &SessionLogRecord) -> Result<()> {
        match self.try_append(record) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(
                    path = %self.path.display(),
                    error = %first,
                    "Session log write failed, retrying once"
                );
                self.try_append(record).map_err(|source| Error::LogWrite {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    fn try_append(&self, record: &SessionLogRecord) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        FileExt::lock_exclusive(&file)?;

        // 加锁后再判断，空文件视为新文件
        let before = file.metadata()?.len();
        let mut buf = String::new();
        if before == 0 {
            push_row(&mut buf, &LOG_HEADER);
        }
        push_row(&mut buf, &record.fields());

        let written = write_or_rollback(&mut file, before, |f| {
            f.write_all(buf.as_bytes())?;
            f.flush()?;
            f.sync_data()
        });
        FileExt::unlock(&file)?;
        written?;

        debug!(path = %self.path.display(), game = %record.game, "Session record appended");
        Ok(())
    }

    /// 读取全部记录（不含表头）
    pub fn read_all(&self) -> Result<Vec<SessionLogRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut content = String::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .map_err(|source| Error::LogWrite {
                path: self.path.clone(),
                source,
            })?;

        Ok(parse_rows(&content)
            .into_iter()
            .filter(|row| row.iter().map(String::as_str).ne(LOG_HEADER))
            .filter_map(|row| match <[String; 4]>::try_from(row) {
                Ok([game, start, end, duration]) => Some(SessionLogRecord {
                    game,
                    start,
                    end,
                    duration,
                }),
                Err(_) => None,
            })
            .collect())
    }
}

/// 写入失败时截断回写入前的长度，重试时不会留下半行
fn write_or_rollback<F>(file: &mut File, before: u64, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let result = write(file);
    if result.is_err() {
        if let Err(e) = file.set_len(before) {
            warn!(error = %e, len = before, "Failed to roll back partial session log write");
        }
    }
    result
}

fn push_row(buf: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        push_field(buf, field);
    }
    buf.push_str(LINE_TERMINATOR);
}

/// 含逗号、引号或换行的字段加引号，内部引号加倍
fn push_field(buf: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        buf.push('"');
        buf.push_str(&field.replace('"', "\"\""));
        buf.push('"');
    } else {
        buf.push_str(field);
    }
}

fn parse_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => row.push(std::mem::take(&mut field)),
            ('\r', false) => {}
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
