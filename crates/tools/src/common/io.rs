//! ファイルI/Oユーティリティ（gzip対応）
//!
//! パス `-` は標準入力 / 標準出力を表す。拡張子 `.gz` のファイルは透過的に圧縮・展開する。

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// 標準入出力を表すパス（`-`）か
pub fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::MultiGzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(io::Stdout),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush underlying file/stdout.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => {
                let file = f.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()
            }
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => {
                let inner = e.finish()?;
                let file = inner.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()
            }
        }
    }
}

/// 新規ファイルとして書き込み用に開く
///
/// 既にファイルが存在する場合は `ErrorKind::AlreadyExists` で失敗し、既存の内容には触れない。
pub fn create_new_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Writer::Stdout(io::stdout()));
    }
    let f = OpenOptions::new().write(true).create_new(true).open(p)?;
    let buffered = BufWriter::new(f);
    if is_gzip(p) {
        let enc = flate2::write::GzEncoder::new(buffered, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(buffered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn dash_means_stdio() {
        assert!(is_stdio(Path::new("-")));
        assert!(!is_stdio(Path::new("-.csv")));
        assert!(!is_stdio(Path::new("pop.csv")));
    }

    #[test]
    fn plain_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        let mut w = create_new_writer(&path).expect("create");
        w.write_all(b"hello\n").expect("write");
        w.close().expect("close");

        let mut s = String::new();
        open_reader(&path).expect("open").read_to_string(&mut s).expect("read");
        assert_eq!(s, "hello\n");
    }

    #[test]
    fn gz_output_is_compressed_and_readable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt.GZ");
        let mut w = create_new_writer(&path).expect("create");
        w.write_all(b"line1\nline2\n").expect("write");
        w.close().expect("close");

        let raw = std::fs::read(&path).expect("read raw");
        assert_eq!(&raw[..2], &[0x1F, 0x8B]);

        let lines: Vec<String> =
            open_reader(&path).expect("open").lines().collect::<io::Result<_>>().expect("lines");
        assert_eq!(lines, vec!["line1", "line2"]);
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, "keep me").expect("seed file");

        let err = create_new_writer(&path).err().expect("should refuse");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "keep me");
    }
}
