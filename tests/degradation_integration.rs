//! Degradation tracking across operations and concurrent callers

use composable_rag::degradation::{DegradationConfig, DegradationLevel, DegradationManager};
use quickcheck_macros::quickcheck;
use std::sync::Arc;

#[test]
fn test_three_graph_failures_mark_partial() {
    let manager = DegradationManager::new();

    for _ in 0..3 {
        manager.record_error("GraphQuery", "timeout");
    }

    let status = manager.get_degradation_status("GraphQuery");
    assert!(status.degraded);
    assert_eq!(status.level, DegradationLevel::Partial);
    assert_eq!(status.reason_str(), "timeout");
    assert_eq!(status.error_count, 3);

    // Other operations are unaffected
    assert!(!manager.is_degraded("VectorQuery"));
}

#[test]
fn test_escalation_to_severe_and_reset() {
    let manager = DegradationManager::new();

    for i in 1..=6 {
        let status = manager.record_error("ResultRefinement", "model unavailable");
        let expected = match i {
            1 | 2 => DegradationLevel::Normal,
            3..=5 => DegradationLevel::Partial,
            _ => DegradationLevel::Severe,
        };
        assert_eq!(status.level, expected, "after {} errors", i);
    }
    assert_eq!(manager.degraded_operations(), vec!["ResultRefinement".to_string()]);

    manager.reset_all_degradations();
    let status = manager.get_degradation_status("ResultRefinement");
    assert!(!status.degraded);
    assert_eq!(status.level, DegradationLevel::Normal);
    assert_eq!(status.error_count, 0);
    assert!(manager.snapshot().contains_key("ResultRefinement"));
}

#[test]
fn test_success_breaks_streak_without_recovery() {
    let manager = DegradationManager::with_config(DegradationConfig {
        partial_threshold: 2,
        severe_threshold: 4,
        streak_decay_secs: None,
    });

    manager.record_error("EntityRecognition", "bad output");
    manager.record_success("EntityRecognition");
    manager.record_error("EntityRecognition", "bad output");
    assert!(!manager.is_degraded("EntityRecognition"));

    manager.record_error("EntityRecognition", "bad output");
    assert!(manager.is_degraded("EntityRecognition"));

    // Success ends the streak but does not clear the level
    manager.record_success("EntityRecognition");
    let status = manager.get_degradation_status("EntityRecognition");
    assert_eq!(status.level, DegradationLevel::Partial);
    assert_eq!(status.error_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_errors_are_not_lost() {
    let manager = Arc::new(DegradationManager::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                manager.record_error("GraphQuery", "timeout");
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let status = manager.get_degradation_status("GraphQuery");
    assert_eq!(status.error_count, 80);
    assert_eq!(status.level, DegradationLevel::Severe);
}

/// Level is monotonic within a streak and never moves more than one step per error
#[quickcheck]
fn prop_level_moves_one_step_at_a_time(events: Vec<bool>) -> bool {
    let manager = DegradationManager::new();
    let mut previous = DegradationLevel::Normal;

    for failed in events {
        if failed {
            let level = manager.record_error("op", "failure").level;
            if level < previous || level.as_u8() > previous.as_u8() + 1 {
                return false;
            }
            previous = level;
        } else {
            manager.record_success("op");
            if manager.get_degradation_status("op").level != previous {
                return false;
            }
        }
    }
    true
}
