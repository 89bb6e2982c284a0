//! Phase planning
//!
//! Flattens the payloads of a selected app collection into one ordered
//! execution plan: script/procedure payloads before the batches (priority
//! <= 0, ascending), one name bucket per batched phase, script/procedure
//! payloads after the batches (priority > 0, ascending). Pure data
//! transformation, no I/O, cheap to re-run; a plan over an empty
//! selection is valid and executes as a no-op.

use std::fmt;
use std::sync::Arc;

use crate::payload::{App, BinaryOption, PayloadKind, ProcedureFn};

/// A script or procedure payload scheduled outside the batched phases.
#[derive(Clone, Copy)]
pub enum SpecialKind<'a> {
    Script(&'a str),
    Procedure(&'a ProcedureFn),
}

impl SpecialKind<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Script(_) => "script",
            Self::Procedure(_) => "procedure",
        }
    }
}

/// A special payload paired with its owning app's option and name, so the
/// worker can publish the option without the payload keeping a back
/// pointer to the app.
#[derive(Clone)]
pub struct SpecialPayload<'a> {
    pub kind: SpecialKind<'a>,
    pub priority: i32,
    pub option: Option<Arc<BinaryOption>>,
    pub app_name: &'a str,
}

/// Derived execution order for one run. Borrows from the selected apps;
/// never persisted.
pub struct ExecutionPlan<'a> {
    /// Script/procedure payloads with priority <= 0, ascending
    pub pre: Vec<SpecialPayload<'a>>,
    /// Package names for the batched removal command
    pub removals: Vec<&'a str>,
    /// Package names for the batched install command
    pub installs: Vec<&'a str>,
    /// Application ids for the batched image-install command
    pub images: Vec<&'a str>,
    /// Script/procedure payloads with priority > 0, ascending
    pub post: Vec<SpecialPayload<'a>>,
}

impl ExecutionPlan<'_> {
    /// Total progress units for this plan.
    ///
    /// Each special, removal and image payload is one unit. Each package
    /// install is two: the package manager reports one download tick and
    /// one install tick per package, and the parser credits both.
    pub fn total_units(&self) -> u64 {
        (self.pre.len()
            + self.post.len()
            + self.removals.len()
            + self.images.len()
            + 2 * self.installs.len()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty()
            && self.removals.is_empty()
            && self.installs.is_empty()
            && self.images.is_empty()
            && self.post.is_empty()
    }
}

impl fmt::Display for ExecutionPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pre payloads:")?;
        for special in &self.pre {
            writeln!(f, "  [{:+}] {} ({})", special.priority, special.kind.label(), special.app_name)?;
        }
        writeln!(f, "package removals: {}", self.removals.join(" "))?;
        writeln!(f, "package installs: {}", self.installs.join(" "))?;
        writeln!(f, "image installs: {}", self.images.join(" "))?;
        writeln!(f, "post payloads:")?;
        for special in &self.post {
            writeln!(f, "  [{:+}] {} ({})", special.priority, special.kind.label(), special.app_name)?;
        }
        write!(f, "total units: {}", self.total_units())
    }
}

/// Build the execution plan for a selection.
///
/// Flatten order is app order, then in-app payload order. The pre/post
/// sorts are stable, so equal priorities keep flatten order. Zero-priority
/// script/procedure payloads land in the pre bucket: they carry no
/// ordering constraint against the batches, but they must run.
pub fn build_plan(apps: &[App]) -> ExecutionPlan<'_> {
    let mut pre = Vec::new();
    let mut removals = Vec::new();
    let mut installs = Vec::new();
    let mut images = Vec::new();
    let mut post = Vec::new();

    for app in apps {
        for payload in &app.payloads {
            match &payload.kind {
                PayloadKind::PackageInstall(name) => installs.push(name.as_str()),
                PayloadKind::PackageRemoval(name) => removals.push(name.as_str()),
                PayloadKind::ImageInstall(name) => images.push(name.as_str()),
                PayloadKind::Script(body) => {
                    push_special(&mut pre, &mut post, SpecialKind::Script(body), payload.priority, app);
                }
                PayloadKind::Procedure(run) => {
                    push_special(&mut pre, &mut post, SpecialKind::Procedure(run), payload.priority, app);
                }
            }
        }
    }

    pre.sort_by_key(|s| s.priority);
    post.sort_by_key(|s| s.priority);

    ExecutionPlan { pre, removals, installs, images, post }
}

fn push_special<'a>(
    pre: &mut Vec<SpecialPayload<'a>>,
    post: &mut Vec<SpecialPayload<'a>>,
    kind: SpecialKind<'a>,
    priority: i32,
    app: &'a App,
) {
    let special = SpecialPayload {
        kind,
        priority,
        option: app.option.clone(),
        app_name: &app.name,
    };
    if priority > 0 {
        post.push(special);
    } else {
        pre.push(special);
    }
}
