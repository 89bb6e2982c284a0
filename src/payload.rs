//! Payload and catalog-entry data model
//!
//! A `Payload` is one unit of install/removal/script/callback work. An
//! `App` groups the payloads of one selectable component together with an
//! optional binary toggle and display metadata. The engine consumes these
//! by reference for the duration of one run; it never mutates them.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

/// Environment variable script payloads read to branch on their app's
/// binary option. Set on the child process, "1" or "0".
pub const OPTION_ENV: &str = "LODESTAR_OPTION";

/// Callback signature for procedure payloads. Receives the owning app's
/// option value (false when the app carries no option).
pub type ProcedureFn = Arc<dyn Fn(bool) -> Result<()> + Send + Sync>;

/// What a payload does when its phase comes up.
#[derive(Clone)]
pub enum PayloadKind {
    /// Install a named package through the batched package-manager phase
    PackageInstall(String),
    /// Remove a named package through the batched package-manager phase
    PackageRemoval(String),
    /// Install a named Flatpak application through the batched image phase
    ImageInstall(String),
    /// Run a shell script body on the host (or inside a configured chroot)
    Script(String),
    /// Call back into driver/hardware-detection code opaque to the engine
    Procedure(ProcedureFn),
}

impl PayloadKind {
    /// Short human-readable description for plan and catalog listings.
    pub fn describe(&self) -> String {
        match self {
            Self::PackageInstall(name) => format!("install {}", name),
            Self::PackageRemoval(name) => format!("remove {}", name),
            Self::ImageInstall(name) => format!("flatpak {}", name),
            Self::Script(_) => "script".to_string(),
            Self::Procedure(_) => "procedure".to_string(),
        }
    }
}

impl fmt::Debug for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageInstall(name) => f.debug_tuple("PackageInstall").field(name).finish(),
            Self::PackageRemoval(name) => f.debug_tuple("PackageRemoval").field(name).finish(),
            Self::ImageInstall(name) => f.debug_tuple("ImageInstall").field(name).finish(),
            Self::Script(body) => f.debug_tuple("Script").field(body).finish(),
            Self::Procedure(_) => f.write_str("Procedure(..)"),
        }
    }
}

/// One unit of install/removal/script/callback work.
///
/// `priority` orders script/procedure payloads around the batched
/// package-manager phases: `<= 0` runs before them, `> 0` after, ties
/// keep catalog declaration order. Priorities on package/image payloads
/// have no effect; the batch phases define their ordering.
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: PayloadKind,
    pub priority: i32,
}

impl Payload {
    /// Package install payload.
    pub fn package(name: impl Into<String>) -> Self {
        Self { kind: PayloadKind::PackageInstall(name.into()), priority: 0 }
    }

    /// Package removal payload.
    pub fn package_removal(name: impl Into<String>) -> Self {
        Self { kind: PayloadKind::PackageRemoval(name.into()), priority: 0 }
    }

    /// Flatpak application payload.
    pub fn image(name: impl Into<String>) -> Self {
        Self { kind: PayloadKind::ImageInstall(name.into()), priority: 0 }
    }

    /// Shell script payload.
    pub fn script(body: impl Into<String>) -> Self {
        Self { kind: PayloadKind::Script(body.into()), priority: 0 }
    }

    /// In-process callback payload.
    pub fn procedure<F>(f: F) -> Self
    where
        F: Fn(bool) -> Result<()> + Send + Sync + 'static,
    {
        Self { kind: PayloadKind::Procedure(Arc::new(f)), priority: 0 }
    }

    /// Set the execution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Description including the priority when it matters.
    pub fn describe(&self) -> String {
        if self.priority == 0 {
            self.kind.describe()
        } else {
            format!("{} (priority {})", self.kind.describe(), self.priority)
        }
    }
}

/// Binary option attached to an app, toggled by the selection layer and
/// published to script payloads through [`OPTION_ENV`].
///
/// Shared by reference between the catalog entry and whatever control is
/// bound to it, hence the atomic value.
pub struct BinaryOption {
    description: String,
    value: AtomicBool,
}

impl BinaryOption {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), value: AtomicBool::new(false) }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for BinaryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOption")
            .field("description", &self.description)
            .field("value", &self.get())
            .finish()
    }
}

/// One selectable component: payloads plus display metadata.
///
/// Created once at catalog construction time and immutable afterwards,
/// except for the option value which the selection layer may toggle
/// before a run starts.
#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub description: String,
    pub payloads: Vec<Payload>,
    pub option: Option<Arc<BinaryOption>>,
    pub category: Option<String>,
}

impl App {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        payloads: Vec<Payload>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payloads,
            option: None,
            category: None,
        }
    }

    pub fn with_option(mut self, option: BinaryOption) -> Self {
        self.option = Some(Arc::new(option));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Current option value; false when the app has no option.
    pub fn option_value(&self) -> bool {
        self.option.as_ref().map(|o| o.get()).unwrap_or(false)
    }

    /// Serializable view for catalog listings.
    pub fn summary(&self) -> AppSummary<'_> {
        AppSummary {
            name: &self.name,
            description: &self.description,
            category: self.category.as_deref(),
            option: self.option.as_ref().map(|o| OptionSummary {
                description: o.description(),
                value: o.get(),
            }),
            payloads: self.payloads.iter().map(Payload::describe).collect(),
        }
    }
}

/// Serializable view of an app for `list --json`.
#[derive(Debug, Serialize)]
pub struct AppSummary<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub category: Option<&'a str>,
    pub option: Option<OptionSummary<'a>>,
    pub payloads: Vec<String>,
}

/// Serializable view of a binary option.
#[derive(Debug, Serialize)]
pub struct OptionSummary<'a> {
    pub description: &'a str,
    pub value: bool,
}
