//! End-to-end sessions over an in-memory duplex link.
//!
//! Each test runs the real orchestrator on both ends — probe, capability,
//! synchronized rate switch, then the transfer — with the peers on two
//! threads, exactly as two processes would sit on a physical cable.

use std::time::Duration;

use engine::orchestrator::{run_receiver, run_sender};
use engine::testing::SeededIds;
use engine::{CancelToken, NullProgress, ProbeConfig, SystemClock, TransferConfig, TransferMode};
use engine::sender::{FileSender, SourceMode};
use transport::testing::memory_link_pair;

fn test_transfer_config() -> TransferConfig {
    TransferConfig {
        request_timeout: Duration::from_secs(10),
        response_timeout: Duration::from_secs(3),
        backoff_base: Duration::from_millis(10),
        ..TransferConfig::default()
    }
}

fn test_probe_config(rates: &[u32]) -> ProbeConfig {
    ProbeConfig {
        supported_baudrates: rates.to_vec(),
        probe_period: Duration::from_millis(300),
        probe_total: Duration::from_secs(5),
        capability_timeout: Duration::from_secs(2),
        capability_wait: Duration::from_secs(2),
        switch_timeout: Duration::from_secs(2),
        switch_wait: Duration::from_secs(2),
        switch_delay_ms: 10,
        ..ProbeConfig::default()
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    let mut state = u32::from(seed) | 1;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 16) as u8
        })
        .collect()
}

/// S1: one 100 kB file, both peers advertising {115200, 460800, 921600};
/// the session lands on 921600 with 2048-byte chunks and the stored bytes
/// equal the source.
#[test]
fn single_small_file_end_to_end() {
    let src_dir = tempfile::tempdir().expect("src dir");
    let dst_dir = tempfile::tempdir().expect("dst dir");
    let source = src_dir.path().join("payload.bin");
    let content = pattern(100_000, 7);
    std::fs::write(&source, &content).expect("write source");

    let (link_a, link_b) = memory_link_pair();
    let sender_rates = [921_600, 460_800, 115_200];
    let receiver_rates = [115_200, 460_800, 921_600];

    let sender = {
        let source = source.clone();
        std::thread::spawn(move || {
            run_sender(
                link_a,
                &source,
                &test_transfer_config(),
                &test_probe_config(&sender_rates),
                &SystemClock,
                &mut SeededIds::new(1),
                &CancelToken::new(),
                &mut NullProgress,
            )
        })
    };

    let outcome = run_receiver(
        link_b,
        dst_dir.path(),
        &test_transfer_config(),
        &test_probe_config(&receiver_rates),
        &SystemClock,
        &mut SeededIds::new(2),
        &CancelToken::new(),
        &mut NullProgress,
    )
    .expect("receiving session");

    let session = sender.join().expect("no panic").expect("sending session");
    assert_eq!(session.baudrate, 921_600);
    assert_eq!(session.chunk_size, 2048);
    assert_eq!(outcome.session.baudrate, 921_600);
    assert_eq!(outcome.session.chunk_size, 2048);
    assert_eq!(outcome.session.mode, TransferMode::Single);

    assert_eq!(outcome.files.len(), 1);
    let dest = &outcome.files[0];
    assert!(dest.starts_with(dst_dir.path()));
    assert_eq!(std::fs::read(dest).expect("read dest"), content);
}

/// S2: disjoint rate lists end the session within the capability window;
/// the sender reports the missing common rate, the receiver times out.
#[test]
fn disjoint_rates_fail_the_session() {
    let src_dir = tempfile::tempdir().expect("src dir");
    let dst_dir = tempfile::tempdir().expect("dst dir");
    let source = src_dir.path().join("payload.bin");
    std::fs::write(&source, b"data").expect("write source");

    let (link_a, link_b) = memory_link_pair();

    let sender = {
        let source = source.clone();
        std::thread::spawn(move || {
            run_sender(
                link_a,
                &source,
                &test_transfer_config(),
                &test_probe_config(&[1_728_000]),
                &SystemClock,
                &mut SeededIds::new(3),
                &CancelToken::new(),
                &mut NullProgress,
            )
        })
    };

    let receiver_err = run_receiver(
        link_b,
        dst_dir.path(),
        &test_transfer_config(),
        &test_probe_config(&[115_200]),
        &SystemClock,
        &mut SeededIds::new(4),
        &CancelToken::new(),
        &mut NullProgress,
    )
    .expect_err("receiver cannot complete");

    let sender_err = sender.join().expect("no panic").expect_err("no common rate");
    assert!(matches!(
        sender_err,
        engine::SessionError::Probe(engine::ProbeError::NoCommonBaudrate)
    ));
    // The receiver either times out waiting for the proposal or sees the
    // peer hang up, depending on which thread loses the race.
    assert!(matches!(
        receiver_err,
        engine::SessionError::Probe(
            engine::ProbeError::Timeout { .. } | engine::ProbeError::Port(_)
        )
    ));

    // Nothing was written.
    assert_eq!(std::fs::read_dir(dst_dir.path()).expect("read dir").count(), 0);
}

/// S5: a directory of five files — a case-colliding pair, two names that
/// sanitize to the same string, and an empty file — all land under the
/// session root with distinct names and equal bytes.
#[test]
fn batch_with_name_collisions_and_empty_file() {
    let src_root = tempfile::tempdir().expect("src root");
    let src_dir = src_root.path().join("photos");
    std::fs::create_dir(&src_dir).expect("mkdir");
    let dst_dir = tempfile::tempdir().expect("dst dir");

    let files: &[(&str, Vec<u8>)] = &[
        ("ALPHA.txt", pattern(2000, 1)),
        ("alpha.txt", pattern(3000, 2)),
        ("empty.dat", Vec::new()),
        ("weird<name>.bin", pattern(1500, 3)),
        ("weird>name<.bin", pattern(1700, 4)),
    ];
    for (name, content) in files {
        std::fs::write(src_dir.join(name), content).expect("write source");
    }

    let (link_a, link_b) = memory_link_pair();
    let rates = [460_800, 115_200];

    let sender = {
        let src_dir = src_dir.clone();
        std::thread::spawn(move || {
            run_sender(
                link_a,
                &src_dir,
                &test_transfer_config(),
                &test_probe_config(&rates),
                &SystemClock,
                &mut SeededIds::new(5),
                &CancelToken::new(),
                &mut NullProgress,
            )
        })
    };

    let outcome = run_receiver(
        link_b,
        dst_dir.path(),
        &test_transfer_config(),
        &test_probe_config(&rates),
        &SystemClock,
        &mut SeededIds::new(6),
        &CancelToken::new(),
        &mut NullProgress,
    )
    .expect("receiving session");

    let session = sender.join().expect("no panic").expect("sending session");
    assert_eq!(session.mode, TransferMode::Batch);
    assert_eq!(session.file_count, 5);
    assert_eq!(outcome.session.root_path, "photos");
    assert_eq!(outcome.files.len(), 5);

    let root = dst_dir.path().join("photos");
    for written in &outcome.files {
        assert!(written.starts_with(&root));
    }

    // Sorted transfer order: ALPHA, alpha, empty, weird<...>, weird>...<.
    let expect = [
        ("ALPHA.txt", &files[0].1),
        ("alpha.txt", &files[1].1),
        ("empty.dat", &files[2].1),
        ("weird_name_.bin", &files[3].1),
        ("weird_name__1.bin", &files[4].1),
    ];
    for ((name, content), written) in expect.iter().zip(&outcome.files) {
        assert_eq!(written, &root.join(name));
        assert_eq!(&std::fs::read(written).expect("read dest"), *content, "{name}");
    }
    assert_eq!(
        std::fs::metadata(root.join("empty.dat")).expect("stat").len(),
        0
    );
}

/// S6: a 32 MiB file with a 4 MiB cache limit streams from an open handle
/// and arrives byte-identical.
#[test]
fn large_file_streams_without_buffering() {
    let src_dir = tempfile::tempdir().expect("src dir");
    let dst_dir = tempfile::tempdir().expect("dst dir");
    let source = src_dir.path().join("large.bin");

    // 32 MiB of a repeating 251-byte cycle, written in 1 MiB slabs.
    let slab: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    {
        use std::io::Write;
        let mut out = std::fs::File::create(&source).expect("create");
        for _ in 0..32 {
            out.write_all(&slab).expect("fill");
        }
    }

    let config = test_transfer_config();
    let probe = FileSender::open(&source, &config).expect("probe open");
    assert_eq!(probe.source_mode(), SourceMode::Streaming);
    drop(probe);

    let (link_a, link_b) = memory_link_pair();
    let rates = [1_728_000];

    let sender = {
        let source = source.clone();
        let config = config.clone();
        std::thread::spawn(move || {
            run_sender(
                link_a,
                &source,
                &config,
                &test_probe_config(&rates),
                &SystemClock,
                &mut SeededIds::new(9),
                &CancelToken::new(),
                &mut NullProgress,
            )
        })
    };

    let outcome = run_receiver(
        link_b,
        dst_dir.path(),
        &config,
        &test_probe_config(&rates),
        &SystemClock,
        &mut SeededIds::new(10),
        &CancelToken::new(),
        &mut NullProgress,
    )
    .expect("receiving session");

    let session = sender.join().expect("no panic").expect("sending session");
    assert_eq!(session.chunk_size, 8192);

    let dest = &outcome.files[0];
    assert_eq!(
        std::fs::metadata(dest).expect("stat").len(),
        32 * 1024 * 1024
    );
    assert_eq!(
        std::fs::read(dest).expect("read dest"),
        std::fs::read(&source).expect("read source")
    );
}

/// Single-file mode with a directory target synthesizes a collision-safe
/// destination name, since the wire carries no name in that mode.
#[test]
fn single_file_into_directory_synthesizes_a_name() {
    let src_dir = tempfile::tempdir().expect("src dir");
    let dst_dir = tempfile::tempdir().expect("dst dir");
    let source = src_dir.path().join("whatever.bin");
    std::fs::write(&source, pattern(4096, 11)).expect("write source");

    let (link_a, link_b) = memory_link_pair();
    let rates = [115_200];

    let sender = {
        let source = source.clone();
        std::thread::spawn(move || {
            run_sender(
                link_a,
                &source,
                &test_transfer_config(),
                &test_probe_config(&rates),
                &SystemClock,
                &mut SeededIds::new(12),
                &CancelToken::new(),
                &mut NullProgress,
            )
        })
    };

    let outcome = run_receiver(
        link_b,
        dst_dir.path(),
        &test_transfer_config(),
        &test_probe_config(&rates),
        &SystemClock,
        &mut SeededIds::new(13),
        &CancelToken::new(),
        &mut NullProgress,
    )
    .expect("receiving session");
    sender.join().expect("no panic").expect("sending session");

    let dest = &outcome.files[0];
    let name = dest.file_name().expect("name").to_string_lossy();
    assert!(
        name.starts_with("received_file_"),
        "unexpected synthesized name {name}"
    );
    assert_eq!(std::fs::metadata(dest).expect("stat").len(), 4096);
}
