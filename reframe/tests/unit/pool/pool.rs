use super::*;
use std::path::PathBuf;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};

fn output(name: &str) -> ProcessedOutput {
    ProcessedOutput {
        path: PathBuf::from(name),
        format: "gif".to_string(),
        size_bytes: 10,
        width: 4,
        height: 4,
        frame_count: 1,
        attempts: 1,
        quality: 85,
        scale: 1.0,
    }
}

#[test]
fn zero_threads_is_rejected() {
    assert!(matches!(
        JobPool::new(Some(0)),
        Err(ReframeError::Validation(_))
    ));
    assert_eq!(JobPool::new(Some(2)).unwrap().threads(), 2);
}

#[test]
fn submitted_jobs_return_their_results() {
    let pool = JobPool::new(Some(2)).unwrap();
    let handles: Vec<_> = (0..8u32).map(|i| pool.submit(move || Ok(i * i))).collect();
    let got: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(got, (0..8u32).map(|i| i * i).collect::<Vec<_>>());

    let err = pool
        .submit(|| -> ReframeResult<()> { Err(ReframeError::validation("nope")) })
        .join()
        .unwrap_err();
    assert!(matches!(err, ReframeError::Validation(_)));
}

#[test]
fn panicking_job_reports_an_error() {
    let pool = JobPool::new(Some(1)).unwrap();
    let h = pool.submit(|| -> ReframeResult<u8> { panic!("boom") });
    assert!(h.join().is_err());
    assert_eq!(pool.submit(|| Ok(7u8)).join().unwrap(), 7);
}

#[test]
fn fingerprint_covers_every_input() {
    let bytes = MediaSource::Bytes(vec![1, 2, 3]);
    let base = fingerprint(&bytes, "identity", None);
    assert_eq!(base, fingerprint(&MediaSource::Bytes(vec![1, 2, 3]), "identity", None));
    assert_ne!(base, fingerprint(&MediaSource::Bytes(vec![1, 2, 4]), "identity", None));
    assert_ne!(base, fingerprint(&bytes, "flip-h", None));
    assert_ne!(base, fingerprint(&bytes, "identity", Some(100)));
    assert_ne!(
        fingerprint(&bytes, "identity", Some(100)),
        fingerprint(&bytes, "identity", Some(101))
    );
    let path = MediaSource::Path(PathBuf::from("/media/a.gif"));
    assert_ne!(fingerprint(&path, "identity", None), base);
    assert_ne!(
        fingerprint(&path, "identity", None),
        fingerprint(&MediaSource::Path(PathBuf::from("/media/b.gif")), "identity", None)
    );
    assert_eq!(base.to_string().len(), 32);
}

#[test]
fn registry_computes_once_per_key() {
    let reg = ResultRegistry::new();
    let key = fingerprint(&MediaSource::Bytes(vec![9]), "identity", None);
    assert!(reg.is_empty());
    assert!(reg.get(key).is_none());

    let a = reg.get_or_compute(key, || Ok(output("a"))).unwrap();
    let b = reg
        .get_or_compute(key, || panic!("must not recompute"))
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(reg.get(key), Some(output("a")));
    assert_eq!(reg.len(), 1);
}

#[test]
fn failed_computation_is_not_recorded() {
    let reg = ResultRegistry::new();
    let key = fingerprint(&MediaSource::Bytes(vec![5]), "identity", None);
    assert!(
        reg.get_or_compute(key, || Err(ReframeError::decode("bad")))
            .is_err()
    );
    assert!(reg.get(key).is_none());
    assert!(reg.is_empty());
    let out = reg.get_or_compute(key, || Ok(output("retry"))).unwrap();
    assert_eq!(out.path, PathBuf::from("retry"));
    assert_eq!(reg.len(), 1);
}

#[test]
fn concurrent_duplicates_wait_for_the_first() {
    let reg = Arc::new(ResultRegistry::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(4));
    let key = fingerprint(&MediaSource::Bytes(vec![1]), "identity", None);

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let reg = Arc::clone(&reg);
            let runs = Arc::clone(&runs);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                reg.get_or_compute(key, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(output("shared"))
                })
                .unwrap()
            })
        })
        .collect();
    for t in threads {
        assert_eq!(t.join().unwrap().path, PathBuf::from("shared"));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn distinct_keys_do_not_block_each_other() {
    let reg = ResultRegistry::new();
    let k1 = fingerprint(&MediaSource::Bytes(vec![1]), "a", None);
    let k2 = fingerprint(&MediaSource::Bytes(vec![1]), "b", None);
    let out = reg
        .get_or_compute(k1, || reg.get_or_compute(k2, || Ok(output("inner"))))
        .unwrap();
    assert_eq!(out.path, PathBuf::from("inner"));
    assert_eq!(reg.len(), 2);
}

#[test]
fn waiter_recomputes_after_a_failed_first_run() {
    let reg = Arc::new(ResultRegistry::new());
    let key = fingerprint(&MediaSource::Bytes(vec![2]), "identity", None);
    let started = Arc::new(Barrier::new(2));

    let first = {
        let (reg, started) = (Arc::clone(&reg), Arc::clone(&started));
        std::thread::spawn(move || {
            reg.get_or_compute(key, || {
                started.wait();
                std::thread::sleep(std::time::Duration::from_millis(30));
                Err(ReframeError::encode("first run failed"))
            })
        })
    };
    started.wait();
    let second = reg.get_or_compute(key, || Ok(output("second"))).unwrap();

    assert!(first.join().unwrap().is_err());
    assert_eq!(second.path, PathBuf::from("second"));
    assert_eq!(reg.get(key), Some(output("second")));
    assert_eq!(reg.len(), 1);
}
