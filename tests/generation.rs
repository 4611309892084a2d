mod support;

use std::collections::BTreeMap;

use rota::notify::{NotificationKind, RecordingNotifier};
use rota::queue::RotationQueue;
use rota::scheduler::{Scheduler, TemplateOutcome};
use rota::scorer::Ineligibility;
use rota::store::Store;
use rota::template::WindowRule;
use support::{p, Lab};

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 0.01
}

#[test]
fn new_member_outranks_recent_and_gap_blocks_latest() {
    let lab = Lab::new(RotationQueue::new("cell culture").with_min_gap(2));
    lab.join(&["A"]);
    lab.history("B", "2024-01", 1);
    lab.history("C", "2024-03", 1);
    lab.template("Cell Culture Room Cleaning", "2024-01", 1);

    let notifier = RecordingNotifier::new();
    let report = Scheduler::new(&lab.store, &notifier)
        .generate(p("2024-04"), None)
        .expect("generate");

    assert_eq!(report.results.len(), 1);
    let TemplateOutcome::Created { instance, selection } = &report.results[0].outcome else {
        panic!("expected an instance, got {:?}", report.results[0].outcome);
    };
    assert_eq!(instance.current_assignees, vec!["A".to_string()]);
    assert_eq!(selection.selected[0].user_id, "A");
    assert!(close(selection.selected[0].score, 326.67));

    let eligible: Vec<&str> = selection
        .ranking
        .eligible
        .iter()
        .map(|s| s.user_id.as_str())
        .collect();
    assert_eq!(eligible, vec!["A", "B"]);
    assert!(close(selection.ranking.eligible[1].score, 161.67));
    assert!(matches!(
        selection.ranking.ineligible.as_slice(),
        [(user, Ineligibility::TooRecent { gap_months: 1, min_gap_months: 2, .. })] if user == "C"
    ));

    let ledger = lab.store.read().expect("read");
    let a = ledger.member(lab.queue_id, "A").expect("A");
    assert_eq!(a.total_assignments, 1);
    assert_eq!(a.last_assigned_period, Some(p("2024-04")));

    let assigned = notifier.of_kind(NotificationKind::NewAssignment);
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].recipients, vec!["A".to_string()]);
}

#[test]
fn generating_twice_keeps_one_instance() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a", "b"]);
    lab.template("Autoclave", "2024-01", 1);

    let notifier = RecordingNotifier::new();
    let mut scheduler = Scheduler::new(&lab.store, &notifier).with_seed(3);
    let first = scheduler.generate(p("2024-05"), None).expect("first");
    let second = scheduler.generate(p("2024-05"), None).expect("second");

    assert_eq!(first.created().count(), 1);
    assert_eq!(second.created().count(), 0);
    let existing: Vec<_> = second.existing().collect();
    let created_id = first.created().next().expect("created").id;
    assert_eq!(existing, vec![created_id]);

    let ledger = lab.store.read().expect("read");
    assert_eq!(ledger.instances.len(), 1);
    let total: u32 = ledger.members_of(lab.queue_id).map(|m| m.total_assignments).sum();
    assert_eq!(total, 1);
}

#[test]
fn min_gap_holds_across_consecutive_months() {
    let lab = Lab::new(RotationQueue::new("q").with_min_gap(3));
    lab.join(&["a", "b", "c"]);
    lab.template("Fume hood check", "2024-01", 1);

    let periods = p("2024-01").through(&p("2024-06"));
    let notifier = RecordingNotifier::new();
    let results = Scheduler::new(&lab.store, &notifier).generate_batch(&periods, None, false);
    assert!(results.values().all(|r| r.is_ok()));

    let ledger = lab.store.read().expect("read");
    let mut by_user: BTreeMap<String, Vec<i32>> = BTreeMap::new();
    for instance in &ledger.instances {
        for user in &instance.current_assignees {
            by_user
                .entry(user.clone())
                .or_default()
                .push(instance.period.months_since(&p("2024-01")));
        }
    }
    assert_eq!(ledger.instances.len(), 6);
    for (user, mut months) in by_user {
        months.sort();
        for pair in months.windows(2) {
            assert!(pair[1] - pair[0] >= 3, "{user} assigned too soon: {months:?}");
        }
    }
}

#[test]
fn assignments_even_out_over_a_year() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a", "b", "c", "d"]);
    lab.template("Glassware", "2024-01", 1);

    let periods = p("2024-01").through(&p("2024-12"));
    let notifier = RecordingNotifier::new();
    Scheduler::new(&lab.store, &notifier).generate_batch(&periods, None, false);

    let counts: Vec<u32> = ["a", "b", "c", "d"]
        .iter()
        .map(|u| lab.total_assignments(u))
        .collect();
    assert_eq!(counts.iter().sum::<u32>(), 12);
    let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
    assert!(spread <= 1, "uneven rotation: {counts:?}");
}

#[test]
fn jitter_does_not_break_fairness() {
    for seed in [1u64, 7, 42, 1234] {
        let lab = Lab::new(RotationQueue::new("q").with_random_factor(0.2));
        lab.join(&["a", "b", "c", "d"]);
        lab.template("Glassware", "2024-01", 1);

        let periods = p("2024-01").through(&p("2025-12"));
        let notifier = RecordingNotifier::new();
        Scheduler::new(&lab.store, &notifier)
            .with_seed(seed)
            .generate_batch(&periods, None, false);

        let counts: Vec<u32> = ["a", "b", "c", "d"]
            .iter()
            .map(|u| lab.total_assignments(u))
            .collect();
        assert_eq!(counts.iter().sum::<u32>(), 24);
        let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
        assert!(spread <= 2, "seed {seed}: {counts:?}");
    }
}

#[test]
fn preview_leaves_the_ledger_alone() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a", "b"]);
    lab.template("Autoclave", "2024-01", 1);

    let notifier = RecordingNotifier::new();
    let report = Scheduler::new(&lab.store, &notifier)
        .preview(p("2024-02"), None)
        .expect("preview");

    assert!(report.preview);
    assert_eq!(report.created().count(), 1);
    assert!(lab.store.read().expect("read").instances.is_empty());
    assert_eq!(lab.total_assignments("a") + lab.total_assignments("b"), 0);
    assert!(notifier.delivered().is_empty());
}

#[test]
fn understaffed_template_is_reported_without_blocking_others() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a"]);
    let pair = lab.template("Two person inventory", "2024-01", 2);
    lab.template("Autoclave", "2024-01", 1);

    let notifier = RecordingNotifier::new();
    let report = Scheduler::new(&lab.store, &notifier)
        .generate(p("2024-01"), None)
        .expect("generate");

    assert_eq!(report.created().count(), 1);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].template_id, pair);

    let ledger = lab.store.read().expect("read");
    assert!(ledger.instance_for(pair, p("2024-01")).is_none());
    assert_eq!(ledger.instances.len(), 1);
}

#[test]
fn out_of_range_window_fails_only_its_template() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a", "b"]);
    let broken = lab.template("Freezer defrost", "2024-01", 1);
    lab.template("Autoclave", "2024-01", 1);
    lab.store
        .transact(|ledger| {
            ledger.template_mut(broken)?.window = WindowRule::Relative {
                start_offset_days: 999_999_999_999,
                end_offset_days: 0,
            };
            Ok(())
        })
        .expect("edit window");

    let notifier = RecordingNotifier::new();
    let report = Scheduler::new(&lab.store, &notifier)
        .generate(p("2024-04"), None)
        .expect("generate");

    assert_eq!(report.created().count(), 1);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].template_id, broken);

    let ledger = lab.store.read().expect("read");
    assert_eq!(ledger.instances.len(), 1);
}

#[test]
fn batch_runs_periods_in_order() {
    let lab = Lab::new(RotationQueue::new("q"));
    lab.join(&["a", "b"]);
    lab.template("Autoclave", "2024-01", 1);

    let notifier = RecordingNotifier::new();
    let results = Scheduler::new(&lab.store, &notifier).generate_batch(
        &[p("2024-03"), p("2024-02"), p("2024-03")],
        None,
        false,
    );

    let periods: Vec<String> = results.keys().map(|p| p.to_string()).collect();
    assert_eq!(periods, vec!["2024-02", "2024-03"]);
    let assignees: Vec<String> = results
        .values()
        .map(|r| {
            let report = r.as_ref().expect("report");
            report.created().next().expect("instance").current_assignees[0].clone()
        })
        .collect();
    assert_eq!(assignees, vec!["a", "b"]);
}
