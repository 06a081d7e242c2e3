//! Line/char counting against a naive byte-by-byte reference.
//!
//! The in-memory properties check that chunking never changes the totals.
//! The file-backed property drives the real read loop with random buffer
//! sizes, so short reads and chunk boundaries land in arbitrary places.

use std::io::Write;

use futures::executor::block_on;
use proptest::prelude::*;
use uring_wordstats::{count_file, AsyncFile, Error, IoContext, IoContextConfig, WordStats};

fn reference(bytes: &[u8]) -> WordStats {
    let mut s = WordStats::default();
    for &b in bytes {
        if b == b'\n' {
            s.lines += 1;
        } else {
            s.chars += 1;
        }
    }
    s
}

/// Bytes biased towards newlines so boundaries are exercised often.
fn content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![3 => Just(b'\n'), 7 => any::<u8>()],
        0..6000,
    )
}

proptest! {
    #[test]
    fn single_chunk_matches_reference(bytes in content()) {
        let mut s = WordStats::default();
        s.accumulate(&bytes);
        prop_assert_eq!(s, reference(&bytes));
        prop_assert_eq!(s.total_bytes(), bytes.len() as u64);
    }

    #[test]
    fn any_split_gives_same_totals(
        bytes in content(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
        points.sort_unstable();

        let mut s = WordStats::default();
        let mut start = 0;
        for p in points {
            s.accumulate(&bytes[start..p]);
            start = p;
        }
        s.accumulate(&bytes[start..]);
        prop_assert_eq!(s, reference(&bytes));
    }

    #[test]
    fn mean_is_defined_iff_there_is_a_newline(bytes in content()) {
        let mut s = WordStats::default();
        s.accumulate(&bytes);
        prop_assert_eq!(s.mean_line_length().is_some(), bytes.contains(&b'\n'));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn read_loop_matches_reference(bytes in content(), buffer_size in 1usize..9000) {
        let ctx = match IoContext::new(IoContextConfig::default()) {
            Ok(ctx) => ctx,
            Err(Error::ContextInit(err)) => {
                eprintln!("skipping: io_uring unavailable: {err}");
                return Ok(());
            }
            Err(err) => panic!("unexpected error: {err}"),
        };

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();

        let file = AsyncFile::open_read_only(&ctx.scheduler(), f.path()).unwrap();
        let got = block_on(count_file(file, buffer_size)).unwrap();
        prop_assert_eq!(got, reference(&bytes));
    }
}
