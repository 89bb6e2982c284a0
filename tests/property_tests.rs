//! Property-based tests
//!
//! Uses proptest for the planner and parser invariants:
//! - Bucket partitioning is total and kind-exact for arbitrary selections
//! - Pre/post buckets are priority-sorted and stable
//! - The progress parser never panics and never walks the bar backwards

use proptest::prelude::*;

use lodestar::parsers::{LineParser, PackageProgressParser};
use lodestar::payload::{App, Payload, PayloadKind};
use lodestar::planner::build_plan;
use lodestar::progress::{Phase, ProgressTracker};

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum PayloadSpec {
    Install(String),
    Removal(String),
    Image(String),
    Script(String, i32),
    Procedure(i32),
}

impl PayloadSpec {
    fn build(&self) -> Payload {
        match self {
            Self::Install(name) => Payload::package(name.clone()),
            Self::Removal(name) => Payload::package_removal(name.clone()),
            Self::Image(name) => Payload::image(name.clone()),
            Self::Script(body, priority) => Payload::script(body.clone()).with_priority(*priority),
            Self::Procedure(priority) => Payload::procedure(|_| Ok(())).with_priority(*priority),
        }
    }

    fn is_special(&self) -> bool {
        matches!(self, Self::Script(..) | Self::Procedure(_))
    }

    fn priority(&self) -> i32 {
        match self {
            Self::Script(_, priority) | Self::Procedure(priority) => *priority,
            _ => 0,
        }
    }
}

fn payload_spec_strategy() -> impl Strategy<Value = PayloadSpec> {
    let name = "[a-z][a-z0-9-]{0,11}";
    prop_oneof![
        name.prop_map(PayloadSpec::Install),
        name.prop_map(PayloadSpec::Removal),
        name.prop_map(PayloadSpec::Image),
        (name.prop_map(String::from), -5..=5i32).prop_map(|(b, p)| PayloadSpec::Script(b, p)),
        (-5..=5i32).prop_map(PayloadSpec::Procedure),
    ]
}

fn selection_strategy() -> impl Strategy<Value = Vec<Vec<PayloadSpec>>> {
    prop::collection::vec(prop::collection::vec(payload_spec_strategy(), 0..6), 0..5)
}

fn build_apps(selection: &[Vec<PayloadSpec>]) -> Vec<App> {
    selection
        .iter()
        .enumerate()
        .map(|(i, specs)| {
            App::new(
                format!("app{}", i),
                "generated",
                specs.iter().map(PayloadSpec::build).collect(),
            )
        })
        .collect()
}

// =============================================================================
// Planner Properties
// =============================================================================

proptest! {
    /// Every payload lands in exactly one bucket, by kind.
    #[test]
    fn plan_partition_is_total(selection in selection_strategy()) {
        let apps = build_apps(&selection);
        let plan = build_plan(&apps);

        let flat: Vec<&PayloadSpec> = selection.iter().flatten().collect();
        let installs = flat.iter().filter(|s| matches!(s, PayloadSpec::Install(_))).count();
        let removals = flat.iter().filter(|s| matches!(s, PayloadSpec::Removal(_))).count();
        let images = flat.iter().filter(|s| matches!(s, PayloadSpec::Image(_))).count();
        let specials = flat.iter().filter(|s| s.is_special()).count();

        prop_assert_eq!(plan.installs.len(), installs);
        prop_assert_eq!(plan.removals.len(), removals);
        prop_assert_eq!(plan.images.len(), images);
        prop_assert_eq!(plan.pre.len() + plan.post.len(), specials);
    }

    /// Pre holds priorities <= 0 sorted ascending; post holds > 0 sorted
    /// ascending.
    #[test]
    fn special_buckets_are_sorted_and_partitioned(selection in selection_strategy()) {
        let apps = build_apps(&selection);
        let plan = build_plan(&apps);

        prop_assert!(plan.pre.iter().all(|s| s.priority <= 0));
        prop_assert!(plan.post.iter().all(|s| s.priority > 0));
        prop_assert!(plan.pre.windows(2).all(|w| w[0].priority <= w[1].priority));
        prop_assert!(plan.post.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    /// Install names keep flatten order (app order, then in-app order).
    #[test]
    fn install_bucket_preserves_flatten_order(selection in selection_strategy()) {
        let apps = build_apps(&selection);
        let plan = build_plan(&apps);

        let expected: Vec<String> = apps
            .iter()
            .flat_map(|app| app.payloads.iter())
            .filter_map(|p| match &p.kind {
                PayloadKind::PackageInstall(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(plan.installs, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    /// Equal-priority specials keep flatten order (the sort is stable).
    #[test]
    fn equal_priority_specials_are_stable(bodies in prop::collection::vec("[a-z]{1,8}", 1..8)) {
        let apps: Vec<App> = bodies
            .iter()
            .map(|body| App::new(body.clone(), "", vec![
                Payload::script(body.clone()).with_priority(-2),
            ]))
            .collect();
        let plan = build_plan(&apps);

        let planned: Vec<&str> = plan.pre.iter().map(|s| s.app_name).collect();
        prop_assert_eq!(planned, bodies.iter().map(String::as_str).collect::<Vec<_>>());
    }

    /// The unit total matches the documented accounting policy.
    #[test]
    fn total_units_follow_the_accounting_policy(selection in selection_strategy()) {
        let apps = build_apps(&selection);
        let plan = build_plan(&apps);

        let expected = (plan.pre.len() + plan.post.len() + plan.removals.len()
            + plan.images.len() + 2 * plan.installs.len()) as u64;
        prop_assert_eq!(plan.total_units(), expected);
    }

    /// Planning twice over the same selection renders identically.
    #[test]
    fn replanning_is_idempotent(selection in selection_strategy()) {
        let apps = build_apps(&selection);
        let first = build_plan(&apps).to_string();
        let second = build_plan(&apps).to_string();
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Parser Properties
// =============================================================================

proptest! {
    /// Arbitrary input lines never panic the parser.
    #[test]
    fn parser_survives_arbitrary_lines(lines in prop::collection::vec(".*", 0..20)) {
        let tracker = ProgressTracker::new();
        tracker.set_total(1000);
        let mut parser = PackageProgressParser::new(tracker);
        for line in &lines {
            parser.on_line(line);
        }
    }

    /// The completed count never decreases, whatever counter sequence the
    /// tool emits.
    #[test]
    fn completed_is_monotonic_under_any_counters(
        counters in prop::collection::vec((0u64..200, 1u64..200), 1..30)
    ) {
        let tracker = ProgressTracker::new();
        tracker.set_total(100_000);
        let mut parser = PackageProgressParser::new(tracker.clone());

        let mut previous = 0;
        for (done, total) in counters {
            parser.on_line(&format!("[{}/{}] something", done, total));
            let now = tracker.completed();
            prop_assert!(now >= previous, "completed went backwards: {} -> {}", previous, now);
            previous = now;
        }
    }

    /// Counter lines only ever move the phase forward through the package
    /// sequence.
    #[test]
    fn parser_phase_stays_in_package_sequence(
        counters in prop::collection::vec((0u64..9, 1u64..9), 1..20)
    ) {
        let tracker = ProgressTracker::new();
        tracker.set_total(1000);
        let mut parser = PackageProgressParser::new(tracker.clone());

        for (done, total) in counters {
            parser.on_line(&format!("[{}/{}] x", done, total));
            let phase = tracker.phase();
            prop_assert!(
                matches!(phase, Phase::Idle | Phase::DownloadingPackages | Phase::InstallingPackages),
                "unexpected phase {:?}",
                phase
            );
        }
    }
}
