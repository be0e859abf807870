use super::*;

#[test]
fn test_fresh_window_accepts_anything() {
    let w = ReplayWindow::new(8192);
    assert!(!w.is_replay(0));
    assert!(!w.is_replay(1_000_000));
}

#[test]
fn test_duplicate_is_replay() {
    let mut w = ReplayWindow::new(8192);
    w.record(100);
    assert!(w.is_replay(100));
    assert!(!w.is_replay(101));
    assert!(!w.is_replay(99));
}

#[test]
fn test_too_old_is_replay() {
    let mut w = ReplayWindow::new(8192);
    w.record(10_000);
    assert!(w.is_replay(10_000 - 8192));
    assert!(!w.is_replay(10_000 - 8191));
}

#[test]
fn test_out_of_order_within_window() {
    let mut w = ReplayWindow::new(64);
    w.record(10);
    w.record(12);
    assert!(!w.is_replay(11));
    w.record(11);
    assert!(w.is_replay(11));
    assert!(w.is_replay(10));
    assert!(w.is_replay(12));
}

#[test]
fn test_large_jump_clears_stale_bits() {
    let mut w = ReplayWindow::new(64);
    w.record(1);
    w.record(2);
    // jump far beyond the window; old bit positions are recycled
    w.record(1 + 64 * 3);
    assert!(!w.is_replay(2 + 64 * 2));
    assert!(w.is_replay(1));
}
