use crate::engine::config::EngineConfig;
use crate::model::window::WindowKind;
use crate::observation::observation_model::ConcreteObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfScopeReason {
    ForeignPackage,
    PermissionDialog,
    CrashDialog,
}

/// Coarse classification of a snapshot, decided before any reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenClass {
    InScope,
    Home,
    AppStopped,
    OutOfScope(OutOfScopeReason),
}

impl ScreenClass {
    pub fn is_special(&self) -> bool {
        !matches!(self, ScreenClass::InScope)
    }
}

/// Decide whether a snapshot short-circuits normal reduction.
pub fn classify_screen(observation: &ConcreteObservation, config: &EngineConfig) -> ScreenClass {
    let flags = &observation.flags;

    if flags.is_app_stopped {
        return ScreenClass::AppStopped;
    }
    if flags.is_home_screen {
        return ScreenClass::Home;
    }
    if flags.is_crash_dialog {
        return ScreenClass::OutOfScope(OutOfScopeReason::CrashDialog);
    }
    if config
        .permission_packages
        .iter()
        .any(|p| p == &observation.package)
    {
        return ScreenClass::OutOfScope(OutOfScopeReason::PermissionDialog);
    }
    if let Some(app) = &config.app_package {
        if !observation.package.is_empty() && &observation.package != app {
            return ScreenClass::OutOfScope(OutOfScopeReason::ForeignPackage);
        }
    }

    ScreenClass::InScope
}

/// Window kind of an in-scope snapshot: the explicit hint when present,
/// otherwise inferred from the window class name.
pub fn infer_window_kind(observation: &ConcreteObservation) -> WindowKind {
    if let Some(kind) = observation.window_kind {
        return kind;
    }

    let class = observation.window.to_lowercase();
    if class.contains("optionsmenu") {
        WindowKind::OptionsMenu
    } else if class.contains("contextmenu") || class.contains("popupmenu") {
        WindowKind::ContextMenu
    } else if class.contains("dialog") {
        WindowKind::Dialog
    } else {
        WindowKind::Activity
    }
}

/// Window identity used for special states, which share one window each.
pub fn special_window(class: ScreenClass) -> Option<(WindowKind, &'static str)> {
    match class {
        ScreenClass::InScope => None,
        ScreenClass::Home => Some((WindowKind::Launcher, "<launcher>")),
        ScreenClass::AppStopped => Some((WindowKind::Placeholder, "<app-stopped>")),
        ScreenClass::OutOfScope(_) => Some((WindowKind::OutOfScope, "<out-of-scope>")),
    }
}
