use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use uring_wordstats::{run, Error, RunConfig, Runtime, WordStats, WorkerPoolConfig};

use crate::{uring_available, write_file};

fn config(workers: usize, buffer_size: usize) -> RunConfig {
    RunConfig {
        pool: WorkerPoolConfig {
            workers,
            spin_iters: 32,
            park_timeout: Duration::from_micros(500),
        },
        buffer_size,
        ..RunConfig::default()
    }
}

fn expected(bytes: &[u8]) -> WordStats {
    let lines = bytes.iter().filter(|&&b| b == b'\n').count() as u64;
    WordStats {
        chars: bytes.len() as u64 - lines,
        lines,
    }
}

#[test]
fn totals_match_file_contents() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let contents: Vec<Vec<u8>> = vec![
        b"one line\n".to_vec(),
        b"no trailing newline".to_vec(),
        b"\n\n\n".to_vec(),
        (0..=255u8).cycle().take(10_000).collect(),
    ];
    let files: Vec<PathBuf> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| write_file(dir.path(), &format!("f{i}"), c))
        .collect();

    let out = run(&files, config(2, 4096)).unwrap();
    for (got, bytes) in out.iter().zip(&contents) {
        assert_eq!(*got, expected(bytes));
        assert_eq!(got.total_bytes(), bytes.len() as u64);
    }
}

#[test]
fn empty_file_yields_zero_counts() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let empty = write_file(dir.path(), "empty", b"");

    let out = run(&[empty], RunConfig::default()).unwrap();
    assert_eq!(out, vec![WordStats { chars: 0, lines: 0 }]);
}

#[test]
fn single_newline_is_one_empty_line() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let nl = write_file(dir.path(), "nl", b"\n");

    let out = run(&[nl], RunConfig::default()).unwrap();
    assert_eq!(out, vec![WordStats { chars: 0, lines: 1 }]);
}

#[test]
fn newline_at_chunk_boundary_is_counted() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = vec![b'z'; 3 * 4096];
    bytes[4095] = b'\n';
    bytes[2 * 4096 - 1] = b'\n';
    bytes[3 * 4096 - 1] = b'\n';
    let path = write_file(dir.path(), "boundary", &bytes);

    let out = run(&[path], config(1, 4096)).unwrap();
    assert_eq!(out[0], WordStats { chars: 3 * 4096 - 3, lines: 3 });
}

#[test]
fn order_follows_input_even_when_first_file_finishes_last() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    // Small reads make the large first file take many more round trips.
    let large = write_file(dir.path(), "large", &b"abcdefg\n".repeat(64 * 1024));
    let small: Vec<PathBuf> = (0..6)
        .map(|i| write_file(dir.path(), &format!("s{i}"), &b"x\n".repeat(i + 1)))
        .collect();

    let mut files = vec![large];
    files.extend(small);

    let out = run(&files, config(4, 64)).unwrap();
    assert_eq!(out[0], WordStats { chars: 7 * 64 * 1024, lines: 64 * 1024 });
    for (i, s) in out[1..].iter().enumerate() {
        let n = i as u64 + 1;
        assert_eq!(*s, WordStats { chars: n, lines: n });
    }
}

#[test]
fn order_holds_when_first_file_completes_after_all_others() {
    if !uring_available() {
        return;
    }
    const SMALL: usize = 6;
    let dir = tempfile::tempdir().unwrap();

    // A FIFO's first read cannot complete until someone writes to it, so the
    // first input is held back until every other file has been read.
    let fifo = dir.path().join("held");
    let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
    // SAFETY: `c_path` is a valid NUL-terminated path.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo: {}", std::io::Error::last_os_error());

    let mut files = vec![fifo.clone()];
    files.extend((0..SMALL).map(|i| write_file(dir.path(), &format!("s{i}"), &b"x\n".repeat(i + 1))));

    let payload = b"held back\nuntil the rest\nfinished\n";
    let rt = Runtime::new(config(4, 4096)).unwrap();

    let out = thread::scope(|s| {
        let rt = &rt;
        let fifo = &fifo;
        s.spawn(move || {
            // Blocks until the run opens the read side.
            let mut writer = OpenOptions::new().write(true).open(fifo).unwrap();
            // Each small file takes one data read and one end-of-file read.
            let deadline = Instant::now() + Duration::from_secs(10);
            while rt.io_stats().completed < 2 * SMALL as u64 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            assert!(rt.io_stats().completed >= 2 * SMALL as u64);
            let _ = writer.write_all(payload);
        });
        rt.run(&files)
    })
    .unwrap();

    assert_eq!(out.len(), SMALL + 1);
    assert_eq!(out[0], expected(payload));
    for (i, s) in out[1..].iter().enumerate() {
        let n = i as u64 + 1;
        assert_eq!(*s, WordStats { chars: n, lines: n });
    }
}

#[test]
fn rerunning_gives_identical_results() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..10)
        .map(|i| write_file(dir.path(), &format!("f{i}"), &b"lorem ipsum\n".repeat(i * 37)))
        .collect();

    let rt = Runtime::new(config(3, 4096)).unwrap();
    let first = rt.run(&files).unwrap();
    let second = rt.run(&files).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, run(&files, config(1, 4096)).unwrap());
}

#[test]
fn missing_middle_file_fails_the_whole_run() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "first", b"ok\n");
    let missing = dir.path().join("second");
    let third = write_file(dir.path(), "third", b"ok\n");

    let err = run(&[first, missing.clone(), third], RunConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "{err}");
    assert_eq!(err.path(), Some(missing.as_path()));
    assert!(err.to_string().contains("second"));
}

#[test]
fn read_failure_fails_the_run() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let ok = write_file(dir.path(), "ok", b"fine\n");
    // Directories open read-only but fail on read with EISDIR.
    let sub = dir.path().join("subdir");
    std::fs::create_dir(&sub).unwrap();

    let err = run(&[ok, sub.clone()], RunConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Read { .. }), "{err}");
    assert_eq!(err.path(), Some(sub.as_path()));
}

#[test]
fn hundred_files_on_four_workers() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let contents: Vec<Vec<u8>> = (0..100usize)
        .map(|i| {
            let line = format!("{}\n", "w".repeat(i % 13));
            line.repeat(i * 7 + 1).into_bytes()
        })
        .collect();
    let files: Vec<PathBuf> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| write_file(dir.path(), &format!("f{i:03}"), c))
        .collect();

    let rt = Runtime::new(config(4, 4096)).unwrap();
    let out = rt.run(&files).unwrap();
    assert_eq!(out.len(), 100);
    for (got, bytes) in out.iter().zip(&contents) {
        assert_eq!(*got, expected(bytes));
    }

    let (pool, io) = rt.shutdown();
    assert_eq!(pool.workers, 4);
    assert_eq!(pool.panics, 0);
    assert!(pool.tasks_spawned >= 100);
    assert_eq!(io.failed, 0);
}

#[test]
fn settled_run_keeps_successes_next_to_failures() {
    if !uring_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"aa\nbb\n");
    let missing = dir.path().join("missing");
    let c = write_file(dir.path(), "c", b"c");

    let rt = Runtime::new(config(2, 4096)).unwrap();
    let reports = rt.run_settled(&[a.clone(), missing.clone(), c.clone()]).unwrap();

    let paths: Vec<_> = reports.iter().map(|r| r.path.clone()).collect();
    assert_eq!(paths, vec![a, missing, c]);
    assert_eq!(*reports[0].result.as_ref().unwrap(), WordStats { chars: 4, lines: 2 });
    assert!(matches!(reports[1].result, Err(Error::Open { .. })));
    assert_eq!(*reports[2].result.as_ref().unwrap(), WordStats { chars: 1, lines: 0 });
}

#[test]
fn invalid_config_is_rejected_before_any_io() {
    let cfg = RunConfig {
        buffer_size: 0,
        ..RunConfig::default()
    };
    assert!(matches!(Runtime::new(cfg), Err(Error::Config(_))));
}
