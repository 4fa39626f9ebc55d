//! Declarative binding of controls to logical actions.
//!
//! Every download control on a page is listed here with the logical action
//! it drives, the source tag reported in telemetry, and the triggers it
//! responds to. Controls sharing an action form one group whose visible
//! state always moves together.

/// How a control was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Pointer click or tap.
    Click,
    /// Keyboard activation (Enter / Space on a focused control).
    Keyboard,
}

/// One row of the action table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBinding {
    /// Control identifier.
    pub control: String,
    /// Logical action; controls with the same action share state.
    pub action: String,
    /// Source tag reported in telemetry.
    pub source: String,
    /// Triggers the control responds to.
    pub triggers: Vec<Trigger>,
}

impl ActionBinding {
    #[must_use]
    pub fn accepts(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }
}

/// Logical action driven by the standard download controls.
pub const DOWNLOAD_ACTION: &str = "download";

/// Table of control bindings.
///
/// # Example
///
/// ```
/// use download_gate::download::{ActionTable, Trigger};
///
/// let table = ActionTable::new()
///     .bind("hero", "download", "hero_cta")
///     .bind("footer", "download", "footer_link");
///
/// assert_eq!(table.resolve("hero").map(|b| b.source.as_str()), Some("hero_cta"));
/// assert_eq!(table.controls_for("download").count(), 2);
/// assert!(table.resolve("hero").is_some_and(|b| b.accepts(Trigger::Keyboard)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTable {
    bindings: Vec<ActionBinding>,
}

impl ActionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard download controls: primary call-to-action, hero button
    /// and footer link, all bound to [`DOWNLOAD_ACTION`].
    #[must_use]
    pub fn download_defaults() -> Self {
        Self::new()
            .bind("primary_cta", DOWNLOAD_ACTION, "primary_cta")
            .bind("hero_download", DOWNLOAD_ACTION, "hero")
            .bind("footer_download", DOWNLOAD_ACTION, "footer")
    }

    /// Binds `control` to `action`, responding to clicks and keyboard
    /// activation. Rebinding a control replaces its previous row.
    #[must_use]
    pub fn bind(self, control: &str, action: &str, source: &str) -> Self {
        self.bind_with_triggers(control, action, source, &[Trigger::Click, Trigger::Keyboard])
    }

    /// Binds `control` with an explicit trigger set.
    #[must_use]
    pub fn bind_with_triggers(
        mut self,
        control: &str,
        action: &str,
        source: &str,
        triggers: &[Trigger],
    ) -> Self {
        self.bindings.retain(|b| b.control != control);
        self.bindings.push(ActionBinding {
            control: control.to_string(),
            action: action.to_string(),
            source: source.to_string(),
            triggers: triggers.to_vec(),
        });
        self
    }

    /// Finds the binding for `control`.
    #[must_use]
    pub fn resolve(&self, control: &str) -> Option<&ActionBinding> {
        self.bindings.iter().find(|b| b.control == control)
    }

    /// Controls bound to `action`, in binding order.
    pub fn controls_for<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.bindings
            .iter()
            .filter(move |b| b.action == action)
            .map(|b| b.control.as_str())
    }

    /// Distinct actions, in first-binding order.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            if !actions.contains(&binding.action.as_str()) {
                actions.push(&binding.action);
            }
        }
        actions
    }

    /// All bindings in order.
    #[must_use]
    pub fn bindings(&self) -> &[ActionBinding] {
        &self.bindings
    }
}
