// src/utils/streams.rs
use std::collections::VecDeque;
use std::fmt;

use log::debug;
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildStream {
    Stdout,
    Stderr,
}

impl fmt::Display for ChildStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildStream::Stdout => write!(f, "stdout"),
            ChildStream::Stderr => write!(f, "stderr"),
        }
    }
}


/// Drains a child's output line by line into the debug log.
///
/// # Arguments
///
/// * `reader` - stdout or stderr handle of the child.
/// * `tool` - Tag used to prefix each log line.
/// * `stream` - Which stream is being drained.
/// * `tail` - Number of trailing lines to keep and return.
///
/// # Returns
/// The last `tail` lines, oldest first. Non-UTF-8 bytes are replaced.
pub async fn log_child_output<R>(
    reader: R,
    tool: &str,
    stream: ChildStream,
    tail: usize,
) -> io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut kept: VecDeque<String> = VecDeque::with_capacity(tail);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']).to_string();
        debug!("{} {}: {}", tool, stream, line);
        if tail > 0 {
            if kept.len() == tail {
                kept.pop_front();
            }
            kept.push_back(line);
        }
    }

    Ok(kept.into())
}


/// Copies a child's stdout into an already opened destination file.
///
/// # Returns
/// Number of bytes written.
pub async fn stream_to_file<R>(mut reader: R, mut file: File) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let written = io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_child_output_keeps_tail() -> anyhow::Result<()> {
        let data: &[u8] = b"one\ntwo\r\nthree\nfour";
        let tail = log_child_output(data, "tool", ChildStream::Stderr, 2).await?;
        assert_eq!(tail, vec!["three".to_string(), "four".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_log_child_output_no_tail() -> anyhow::Result<()> {
        let data: &[u8] = b"one\ntwo\n";
        let tail = log_child_output(data, "tool", ChildStream::Stdout, 0).await?;
        assert!(tail.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_log_child_output_lossy() -> anyhow::Result<()> {
        let data: &[u8] = b"ok\n\xff\xfe\n";
        let tail = log_child_output(data, "tool", ChildStream::Stderr, 5).await?;
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_to_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("counts.txt");
        let file = File::create(&path).await?;
        let data: &[u8] = b"geneA\t5\ngeneB\t3\n";
        let written = stream_to_file(data, file).await?;
        assert_eq!(written, data.len() as u64);
        assert_eq!(std::fs::read(&path)?, data);
        Ok(())
    }
}
