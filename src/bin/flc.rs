use std::io::{self, Read};
use std::path::Path;
use std::process;

use clap::Parser;

use linecount_rs::common::io::{mmap_regular, open_noatime};
use linecount_rs::common::{io_error_msg, reset_sigpipe};
use linecount_rs::count::{
    NEWLINE, count_byte, count_stream, count_stream_with_capacity,
};

#[derive(Parser)]
#[command(
    name = "flc",
    about = "Count newline bytes in each FILE as fast as memory bandwidth allows"
)]
struct Cli {
    /// Count BYTE instead of newline (a single character, or 0xNN)
    #[arg(short = 'b', long = "byte", value_name = "BYTE", value_parser = parse_byte)]
    byte: Option<u8>,

    /// Stream buffer capacity in bytes (forces the streaming path;
    /// rounded up to a whole number of SIMD lanes)
    #[arg(long = "buffer-size", value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Files to process (reads stdin if none given)
    files: Vec<String>,
}

/// Parse the -b/--byte operand: one literal byte or a 0xNN escape.
fn parse_byte(s: &str) -> Result<u8, String> {
    let bytes = s.as_bytes();
    if bytes.len() == 1 {
        return Ok(bytes[0]);
    }
    if let Some(hex) = s.strip_prefix("0x") {
        if let Ok(v) = u8::from_str_radix(hex, 16) {
            return Ok(v);
        }
    }
    Err(format!("'{}' is not a single byte", s))
}

/// Count in one named file. Regular files are mmap'd and counted with a
/// single whole-buffer kernel call (chunk-boundary independence makes this
/// equivalent to streaming); pipes, devices, and mmap failures fall back to
/// the aligned-buffer streaming driver. An explicit capacity always streams
/// so the requested buffer size is honored.
fn count_path(path: &Path, needle: u8, capacity: Option<usize>) -> Result<u64, String> {
    let mut file = open_noatime(path).map_err(|e| io_error_msg(&e))?;
    if capacity.is_none() {
        if let Some(mmap) = mmap_regular(&file) {
            return Ok(count_byte(&mmap, needle));
        }
    }
    stream_count(&mut file, needle, capacity)
}

fn stream_count(
    reader: &mut impl Read,
    needle: u8,
    capacity: Option<usize>,
) -> Result<u64, String> {
    let result = match capacity {
        Some(cap) => count_stream_with_capacity(reader, needle, cap),
        None => count_stream(reader, needle),
    };
    result.map_err(|e| e.to_string())
}

fn main() {
    reset_sigpipe();
    let cli = Cli::parse();

    let needle = cli.byte.unwrap_or(NEWLINE);

    let files: Vec<String> = if cli.files.is_empty() {
        vec!["-".to_string()] // stdin
    } else {
        cli.files.clone()
    };

    let mut total: u64 = 0;
    let mut had_error = false;

    for filename in &files {
        let result = if filename == "-" {
            stream_count(&mut io::stdin().lock(), needle, cli.buffer_size)
        } else {
            count_path(Path::new(filename), needle, cli.buffer_size)
        };

        match result {
            Ok(count) => {
                total += count;
                if filename == "-" {
                    println!("{}", count);
                } else {
                    println!("{} {}", count, filename);
                }
            }
            Err(msg) => {
                eprintln!("flc: {}: {}", filename, msg);
                had_error = true;
            }
        }
    }

    if files.len() > 1 {
        println!("{} total", total);
    }

    if had_error {
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::process::{Command, Stdio};

    fn cmd() -> Command {
        let mut path = std::env::current_exe().unwrap();
        path.pop();
        path.pop();
        path.push("flc");
        Command::new(path)
    }

    #[test]
    fn test_flc_stdin() {
        let mut child = cmd()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(b"a\nbb\n\nccc")
            .unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");
    }

    #[test]
    fn test_flc_stdin_empty() {
        let mut child = cmd()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        drop(child.stdin.take().unwrap());
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0");
    }

    #[test]
    fn test_flc_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "one\ntwo\nthree\n").unwrap();
        let output = cmd().arg(file.to_str().unwrap()).output().unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.starts_with("3 "));
        assert!(stdout.contains("test.txt"));
    }

    #[test]
    fn test_flc_file_no_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("partial.txt");
        std::fs::write(&file, "no newline here").unwrap();
        let output = cmd().arg(file.to_str().unwrap()).output().unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).starts_with("0 "));
    }

    #[test]
    fn test_flc_multiple_files_total() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = dir.path().join("a.txt");
        let f2 = dir.path().join("b.txt");
        std::fs::write(&f1, "x\n").unwrap();
        std::fs::write(&f2, "y\nz\n").unwrap();
        let output = cmd()
            .args([f1.to_str().unwrap(), f2.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("3 total"));
    }

    #[test]
    fn test_flc_missing_file_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "ok\n").unwrap();
        let output = cmd()
            .args(["/nonexistent_xyz_flc", good.to_str().unwrap()])
            .output()
            .unwrap();
        // Remaining files are still counted, but the exit status reports failure.
        assert!(!output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("1 "));
        assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
    }

    #[test]
    fn test_flc_byte_flag() {
        let mut child = cmd()
            .args(["-b", "x"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(b"xaxbx\n")
            .unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");
    }

    #[test]
    fn test_flc_byte_flag_hex() {
        let mut child = cmd()
            .args(["--byte", "0x0a"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child.stdin.take().unwrap().write_all(b"a\nb\n").unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "2");
    }

    #[test]
    fn test_flc_buffer_size_matches_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        let line = b"0123456789012345678901234567890\n"; // 32 bytes
        let mut data = Vec::new();
        for _ in 0..10_000 {
            data.extend_from_slice(line);
        }
        data.extend_from_slice(b"tail without newline");
        std::fs::write(&file, &data).unwrap();

        let default_out = cmd().arg(file.to_str().unwrap()).output().unwrap();
        let small_out = cmd()
            .args(["--buffer-size", "4096", file.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(default_out.status.success());
        assert!(small_out.status.success());
        assert_eq!(
            String::from_utf8_lossy(&default_out.stdout).split(' ').next(),
            String::from_utf8_lossy(&small_out.stdout).split(' ').next()
        );
        assert!(String::from_utf8_lossy(&default_out.stdout).starts_with("10000 "));
    }

    #[test]
    fn test_flc_one_mib_of_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("newlines.txt");
        std::fs::write(&file, vec![b'\n'; 1 << 20]).unwrap();
        let output = cmd()
            .args(["--buffer-size", "131072", file.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).starts_with("1048576 "));
    }
}
