//! Tests for phase planning
//!
//! These verify:
//! - Payload classification into the five plan buckets
//! - Priority ordering and stability of the pre/post buckets
//! - Determinism of repeated planning over an identical selection

use lodestar::payload::{App, Payload};
use lodestar::planner::{SpecialKind, build_plan};

fn script_body(kind: SpecialKind<'_>) -> &str {
    match kind {
        SpecialKind::Script(body) => body,
        SpecialKind::Procedure(_) => panic!("expected a script payload"),
    }
}

// =============================================================================
// Bucketing
// =============================================================================

#[test]
fn test_payloads_classify_by_kind() {
    let apps = vec![
        App::new("A", "", vec![
            Payload::package("one"),
            Payload::package_removal("gone"),
            Payload::image("org.example.App"),
            Payload::script("echo hi").with_priority(-1),
            Payload::procedure(|_| Ok(())).with_priority(2),
        ]),
    ];
    let plan = build_plan(&apps);

    assert_eq!(plan.installs, vec!["one"]);
    assert_eq!(plan.removals, vec!["gone"]);
    assert_eq!(plan.images, vec!["org.example.App"]);
    assert_eq!(plan.pre.len(), 1);
    assert_eq!(plan.post.len(), 1);
}

#[test]
fn test_priority_on_batched_payloads_does_not_move_them() {
    let apps = vec![App::new("A", "", vec![
        Payload::package("early").with_priority(-5),
        Payload::package("late").with_priority(5),
    ])];
    let plan = build_plan(&apps);

    // Batch membership is decided by kind alone
    assert_eq!(plan.installs, vec!["early", "late"]);
    assert!(plan.pre.is_empty());
    assert!(plan.post.is_empty());
}

#[test]
fn test_install_order_is_flatten_order_across_apps() {
    let apps = vec![
        App::new("A", "", vec![Payload::package("a1"), Payload::package("a2")]),
        App::new("B", "", vec![Payload::package("b1")]),
        App::new("C", "", vec![Payload::package("c1"), Payload::package("c2")]),
    ];
    let plan = build_plan(&apps);
    assert_eq!(plan.installs, vec!["a1", "a2", "b1", "c1", "c2"]);
}

// =============================================================================
// Priority Ordering
// =============================================================================

#[test]
fn test_pre_bucket_sorted_ascending() {
    let apps = vec![
        App::new("A", "", vec![Payload::script("third").with_priority(0)]),
        App::new("B", "", vec![Payload::script("first").with_priority(-9)]),
        App::new("C", "", vec![Payload::script("second").with_priority(-3)]),
    ];
    let plan = build_plan(&apps);
    let bodies: Vec<&str> = plan.pre.iter().map(|s| script_body(s.kind)).collect();
    assert_eq!(bodies, vec!["first", "second", "third"]);
}

#[test]
fn test_post_bucket_sorted_ascending() {
    let apps = vec![
        App::new("A", "", vec![Payload::script("last").with_priority(9)]),
        App::new("B", "", vec![Payload::script("soon").with_priority(1)]),
    ];
    let plan = build_plan(&apps);
    let bodies: Vec<&str> = plan.post.iter().map(|s| script_body(s.kind)).collect();
    assert_eq!(bodies, vec!["soon", "last"]);
}

#[test]
fn test_equal_priorities_keep_declaration_order() {
    let apps = vec![
        App::new("A", "", vec![
            Payload::script("a-one").with_priority(-1),
            Payload::script("a-two").with_priority(-1),
        ]),
        App::new("B", "", vec![Payload::script("b-one").with_priority(-1)]),
    ];
    let plan = build_plan(&apps);
    let bodies: Vec<&str> = plan.pre.iter().map(|s| script_body(s.kind)).collect();
    assert_eq!(bodies, vec!["a-one", "a-two", "b-one"]);
}

#[test]
fn test_zero_priority_specials_execute_in_pre_phase() {
    // A zero-priority script carries no ordering constraint against the
    // batches, but it must not be dropped from the plan.
    let apps = vec![App::new("Tweaks", "", vec![Payload::script("echo tweak")])];
    let plan = build_plan(&apps);
    assert_eq!(plan.pre.len(), 1);
    assert!(plan.post.is_empty());
    assert_eq!(plan.total_units(), 1);
}

// =============================================================================
// Option Association
// =============================================================================

#[test]
fn test_specials_carry_their_apps_option() {
    use lodestar::payload::BinaryOption;

    let apps = vec![
        App::new("WithOpt", "", vec![Payload::script("echo a")])
            .with_option(BinaryOption::new("toggle me")),
        App::new("Without", "", vec![Payload::script("echo b")]),
    ];
    if let Some(option) = &apps[0].option {
        option.set(true);
    }

    let plan = build_plan(&apps);
    let with_opt = plan.pre.iter().find(|s| s.app_name == "WithOpt").expect("planned");
    let without = plan.pre.iter().find(|s| s.app_name == "Without").expect("planned");

    assert_eq!(with_opt.option.as_ref().map(|o| o.get()), Some(true));
    assert!(without.option.is_none());
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_replanning_is_deterministic() {
    let apps = vec![
        App::new("Flathub", "", vec![Payload::script("remote-add").with_priority(-1)]),
        App::new("Steam", "", vec![
            Payload::package("steam"),
            Payload::script("patch").with_priority(1),
        ]),
        App::new("Codecs", "", vec![
            Payload::package_removal("noopenh264"),
            Payload::package("openh264"),
        ]),
        App::new("OBS", "", vec![Payload::image("com.obsproject.Studio")]),
    ];

    let first = build_plan(&apps).to_string();
    let second = build_plan(&apps).to_string();
    assert_eq!(first, second);
}

#[test]
fn test_empty_selection_plans_to_a_no_op() {
    let plan = build_plan(&[]);
    assert!(plan.is_empty());
    assert_eq!(plan.total_units(), 0);
}
