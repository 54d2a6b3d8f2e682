//! Configurable signal panel: buttons, tickboxes, text and number inputs
//!
//! Each element carries a signal string and optionally a bound property.
//! Edge-triggered elements (buttons, text, numbers) emit or propagate
//! immediately on interaction; continuous elements (tickboxes) only store
//! their state and are re-emitted on every periodic update pass while the
//! panel is active. Label and signal arrays stay index-aligned with the
//! element list at all times so saves round-trip the full current state.

use std::collections::HashMap;

/// Where a fired side-effect came from: an element being used, or a
/// continuous element sitting in its off state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Primary,
    Secondary,
}

/// Outbound wiring seam: signals leave the panel through here
pub trait SignalPort {
    fn send_signal(&mut self, connection: &str, signal: &str);
    fn apply_effect(&mut self, effect: &str, kind: EffectKind);
}

/// Collaborators that expose named string properties the panel can bind to
pub trait PropertyBus {
    /// Value of the first collaborator exposing the property, if any
    fn read_first(&self, name: &str) -> Option<String>;
    /// Pushes a value to every collaborator exposing the property.
    /// Collaborators without the property are skipped, never an error.
    fn write_all(&mut self, name: &str, value: &str);
}

/// A bus with no collaborators, for panels that only emit wire signals
pub struct NullBus;

impl PropertyBus for NullBus {
    fn read_first(&self, _name: &str) -> Option<String> {
        None
    }

    fn write_all(&mut self, _name: &str, _value: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Button,
    Tickbox,
    TextInput { max_length: usize },
    NumberInput { min: f32, max: f32, integer_only: bool },
}

impl ElementKind {
    /// Continuous elements defer emission to the periodic update pass
    fn is_continuous(&self) -> bool {
        matches!(self, ElementKind::Tickbox)
    }
}

pub const DEFAULT_NUMBER_INPUT_MIN: f32 = 0.0;
pub const DEFAULT_NUMBER_INPUT_MAX: f32 = 99.0;

/// Construction-time description of one panel element
#[derive(Debug, Clone)]
pub struct ElementDef {
    pub kind: ElementKind,
    pub label: String,
    /// Wire connection the signal leaves through; empty = unwired
    pub connection: String,
    /// Explicit initial signal; takes priority over any property binding
    pub signal: Option<String>,
    pub property_name: Option<String>,
    /// Restrict property reads/writes to the panel itself
    pub target_only_parent_property: bool,
    pub effects: Vec<String>,
}

impl ElementDef {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            label: String::new(),
            connection: String::new(),
            signal: None,
            property_name: None,
            target_only_parent_property: false,
            effects: Vec::new(),
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn connection(mut self, connection: &str) -> Self {
        self.connection = connection.to_string();
        self
    }

    pub fn signal(mut self, signal: &str) -> Self {
        self.signal = Some(signal.to_string());
        self
    }

    pub fn property(mut self, name: &str, target_only_parent: bool) -> Self {
        self.property_name = Some(name.to_string());
        self.target_only_parent_property = target_only_parent;
        self
    }

    pub fn effect(mut self, effect: &str) -> Self {
        self.effects.push(effect.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct InterfaceElement {
    kind: ElementKind,
    continuous: bool,
    label: String,
    connection: String,
    signal: String,
    state: bool,
    property_name: Option<String>,
    target_only_parent_property: bool,
    should_set_property: bool,
    effects: Vec<String>,
}

/// A signal panel device and its ordered element list.
/// Element identity is the position in this list; labels and signals
/// arrays are always index-aligned to it.
pub struct SignalPanel {
    pub device_id: u16,
    elements: Vec<InterfaceElement>,
    labels: Vec<String>,
    signals: Vec<String>,
    /// The panel's own bound property values ("parent" targets)
    properties: HashMap<String, String>,
    unsent_changes: bool,
}

impl SignalPanel {
    /// Builds the panel, resolving each element's initial signal by priority:
    /// explicit signal attribute, bound parent property, first collaborator
    /// sharing the property, then the literal "1".
    pub fn new(
        device_id: u16,
        defs: Vec<ElementDef>,
        initial_properties: HashMap<String, String>,
        bus: &dyn PropertyBus,
    ) -> Self {
        let mut elements = Vec::with_capacity(defs.len());
        let mut button_count = 0usize;
        let mut tickbox_count = 0usize;

        for def in defs {
            let continuous = def.kind.is_continuous();
            let has_property = def.property_name.is_some();

            let (signal, should_set_property) = if let Some(signal) = &def.signal {
                (signal.clone(), has_property)
            } else if let Some(name) = &def.property_name {
                let resolved = if def.target_only_parent_property {
                    initial_properties.get(name).cloned()
                } else {
                    bus.read_first(name)
                };
                (resolved.unwrap_or_else(|| "1".to_string()), false)
            } else {
                ("1".to_string(), false)
            };

            let label = if def.label.is_empty() {
                // default labels are numbered per continuity class
                if continuous {
                    tickbox_count += 1;
                    format!("Signal out {}", tickbox_count - 1)
                } else {
                    button_count += 1;
                    format!("Signal out {}", button_count - 1)
                }
            } else {
                def.label
            };

            elements.push(InterfaceElement {
                continuous,
                kind: def.kind,
                label,
                connection: def.connection,
                signal,
                state: false,
                property_name: def.property_name,
                target_only_parent_property: def.target_only_parent_property,
                should_set_property,
                effects: def.effects,
            });
        }

        let mut panel = Self {
            device_id,
            elements,
            labels: Vec::new(),
            signals: Vec::new(),
            properties: initial_properties,
            unsent_changes: true,
        };
        panel.labels = panel.elements.iter().map(|e| e.label.clone()).collect();
        panel.signals = panel.elements.iter().map(|e| e.signal.clone()).collect();
        panel
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn signal(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(|e| e.signal.as_str())
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(|e| e.label.as_str())
    }

    pub fn state(&self, index: usize) -> Option<bool> {
        self.elements.get(index).map(|e| e.state)
    }

    pub fn states(&self) -> Vec<bool> {
        self.elements.iter().map(|e| e.state).collect()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|v| v.as_str())
    }

    /// Replaces element labels. Entries beyond the input keep their prior
    /// value; the stored array always matches the element count.
    pub fn set_labels(&mut self, new_labels: &[String]) {
        if self.elements.is_empty() {
            return;
        }
        self.labels = Vec::with_capacity(self.elements.len());
        for (i, element) in self.elements.iter_mut().enumerate() {
            let label = match new_labels.get(i) {
                Some(label) => label.clone(),
                None => element.label.clone(),
            };
            element.label = label.clone();
            self.labels.push(label);
        }
        self.unsent_changes = true;
    }

    /// Labels as a comma-separated persisted string
    pub fn set_labels_csv(&mut self, csv: &str) {
        let split = split_persisted(csv, ',');
        self.set_labels(&split);
    }

    /// Replaces element signals with the same padding rule as labels.
    /// An updated element bound to a property pushes the new value to its
    /// targets immediately, but only when the signal actually changed.
    pub fn set_signals(&mut self, new_signals: &[String], bus: &mut dyn PropertyBus) {
        if self.elements.is_empty() {
            return;
        }
        self.signals = Vec::with_capacity(self.elements.len());
        for i in 0..self.elements.len() {
            if let Some(new_signal) = new_signals.get(i) {
                let changed = self.elements[i].signal != *new_signal;
                self.elements[i].should_set_property = changed;
                self.elements[i].signal = new_signal.clone();
                self.signals.push(new_signal.clone());
            } else {
                self.signals.push(self.elements[i].signal.clone());
            }

            if self.elements[i].property_name.is_some() && self.elements[i].should_set_property {
                self.push_property(i, bus);
                self.elements[i].should_set_property = false;
            }
        }
        self.unsent_changes = true;
    }

    /// Signals as a semicolon-separated persisted string; commas may appear
    /// inside individual signal values
    pub fn set_signals_csv(&mut self, csv: &str, bus: &mut dyn PropertyBus) {
        let split = split_persisted(csv, ';');
        self.set_signals(&split, bus);
    }

    fn push_property(&mut self, index: usize, bus: &mut dyn PropertyBus) {
        let element = &self.elements[index];
        let name = match &element.property_name {
            Some(name) => name.clone(),
            None => return,
        };
        let value = element.signal.clone();
        if element.target_only_parent_property {
            self.properties.insert(name, value);
        } else {
            bus.write_all(&name, &value);
        }
    }

    /// Emits the element's current signal on its wired connection and fires
    /// its side-effects. Unwired buttons only fire effects.
    pub fn button_activated(&mut self, index: usize, port: &mut dyn SignalPort) {
        let Some(element) = self.elements.get(index) else {
            return;
        };
        if !element.connection.is_empty() {
            port.send_signal(&element.connection, &element.signal);
        }
        for effect in &element.effects {
            port.apply_effect(effect, EffectKind::Primary);
        }
    }

    /// Stores the toggle state only; emission happens on the next update pass
    pub fn tickbox_toggled(&mut self, index: usize, state: bool) {
        if let Some(element) = self.elements.get_mut(index) {
            element.state = state;
            self.unsent_changes = true;
        }
    }

    /// Stores the text as the element's signal and propagates it to bound
    /// property targets immediately
    pub fn text_changed(&mut self, index: usize, text: &str, bus: &mut dyn PropertyBus) {
        let Some(element) = self.elements.get_mut(index) else {
            return;
        };
        let text = match element.kind {
            ElementKind::TextInput { max_length } => {
                // truncate on a char boundary, max_length counts characters
                match text.char_indices().nth(max_length) {
                    Some((byte_index, _)) => &text[..byte_index],
                    None => text,
                }
            }
            _ => text,
        };
        element.signal = text.to_string();
        self.propagate_immediate(index, bus);
        self.unsent_changes = true;
    }

    /// Clamps the value into the element's bounds, stores it as the signal
    /// and propagates to bound property targets immediately
    pub fn number_changed(&mut self, index: usize, value: f32, bus: &mut dyn PropertyBus) {
        let Some(element) = self.elements.get_mut(index) else {
            return;
        };
        let (min, max, integer_only) = match element.kind {
            ElementKind::NumberInput {
                min,
                max,
                integer_only,
            } => (min, max, integer_only),
            _ => (
                DEFAULT_NUMBER_INPUT_MIN,
                DEFAULT_NUMBER_INPUT_MAX,
                false,
            ),
        };
        let clamped = value.clamp(min, max);
        element.signal = if integer_only {
            format!("{}", clamped.round() as i64)
        } else {
            format!("{}", clamped)
        };
        self.propagate_immediate(index, bus);
        self.unsent_changes = true;
    }

    fn propagate_immediate(&mut self, index: usize, bus: &mut dyn PropertyBus) {
        let element = &self.elements[index];
        if element.property_name.is_none() {
            return;
        }
        self.push_property(index, bus);
    }

    /// Periodic update pass: every wired continuous element with a non-empty
    /// signal re-emits each tick, the signal when toggled on or "0" when off,
    /// firing primary effects while on and secondary effects while off.
    pub fn update(&mut self, port: &mut dyn SignalPort) {
        for element in &self.elements {
            if !element.continuous {
                continue;
            }
            if !element.signal.is_empty() && !element.connection.is_empty() {
                let signal = if element.state { element.signal.as_str() } else { "0" };
                port.send_signal(&element.connection, signal);
            }
            for effect in &element.effects {
                let kind = if element.state {
                    EffectKind::Primary
                } else {
                    EffectKind::Secondary
                };
                port.apply_effect(effect, kind);
            }
        }
    }

    /// Recomputes the persisted label/signal strings from the live elements.
    /// The element list is the source of truth, not the cached arrays.
    pub fn save(&mut self) -> (String, String) {
        self.labels = self.elements.iter().map(|e| e.label.clone()).collect();
        self.signals = self.elements.iter().map(|e| e.signal.clone()).collect();
        (self.labels.join(","), self.signals.join(";"))
    }

    pub fn take_unsent_changes(&mut self) -> bool {
        std::mem::take(&mut self.unsent_changes)
    }
}

fn split_persisted(value: &str, separator: char) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(separator).map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records signals and effects; collaborator properties as a flat map
    #[derive(Default)]
    struct TestHarness {
        sent: Vec<(String, String)>,
        effects: Vec<(String, EffectKind)>,
        shared: HashMap<String, Vec<String>>,
    }

    impl TestHarness {
        fn with_shared(properties: &[(&str, &str)]) -> Self {
            let mut shared: HashMap<String, Vec<String>> = HashMap::new();
            for (name, value) in properties {
                shared
                    .entry(name.to_string())
                    .or_default()
                    .push(value.to_string());
            }
            Self {
                shared,
                ..Self::default()
            }
        }
    }

    impl SignalPort for TestHarness {
        fn send_signal(&mut self, connection: &str, signal: &str) {
            self.sent.push((connection.to_string(), signal.to_string()));
        }

        fn apply_effect(&mut self, effect: &str, kind: EffectKind) {
            self.effects.push((effect.to_string(), kind));
        }
    }

    impl PropertyBus for TestHarness {
        fn read_first(&self, name: &str) -> Option<String> {
            self.shared.get(name).and_then(|v| v.first().cloned())
        }

        fn write_all(&mut self, name: &str, value: &str) {
            if let Some(values) = self.shared.get_mut(name) {
                for stored in values.iter_mut() {
                    *stored = value.to_string();
                }
            }
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_initial_signal_priority() {
        let harness = TestHarness::with_shared(&[("locked", "true")]);
        let mut parent_props = HashMap::new();
        parent_props.insert("mode".to_string(), "manual".to_string());

        let panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Button).signal("explicit"),
                ElementDef::new(ElementKind::Button).property("mode", true),
                ElementDef::new(ElementKind::Button).property("locked", false),
                ElementDef::new(ElementKind::Button),
            ],
            parent_props,
            &harness,
        );

        assert_eq!(panel.signal(0), Some("explicit"));
        assert_eq!(panel.signal(1), Some("manual"));
        assert_eq!(panel.signal(2), Some("true"));
        assert_eq!(panel.signal(3), Some("1"));
    }

    #[test]
    fn test_default_labels_numbered_per_continuity_class() {
        let panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Button),
                ElementDef::new(ElementKind::Tickbox),
                ElementDef::new(ElementKind::Button),
                ElementDef::new(ElementKind::Tickbox),
            ],
            HashMap::new(),
            &NullBus,
        );

        assert_eq!(panel.label(0), Some("Signal out 0"));
        assert_eq!(panel.label(1), Some("Signal out 0"));
        assert_eq!(panel.label(2), Some("Signal out 1"));
        assert_eq!(panel.label(3), Some("Signal out 1"));
    }

    #[test]
    fn test_set_labels_pads_from_prior_values() {
        let mut panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Button).label("one"),
                ElementDef::new(ElementKind::Button).label("two"),
                ElementDef::new(ElementKind::Button).label("three"),
            ],
            HashMap::new(),
            &NullBus,
        );

        panel.set_labels(&strings(&["uno"]));
        assert_eq!(panel.labels(), &strings(&["uno", "two", "three"]));

        // longer input than element count is truncated to the element count
        panel.set_labels(&strings(&["a", "b", "c", "d", "e"]));
        assert_eq!(panel.labels().len(), 3);
        assert_eq!(panel.labels(), &strings(&["a", "b", "c"]));

        // empty persisted string keeps everything
        panel.set_labels_csv("");
        assert_eq!(panel.labels(), &strings(&["a", "b", "c"]));
    }

    #[test]
    fn test_set_signals_array_length_invariant() {
        let mut bus = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Tickbox).signal("s0"),
                ElementDef::new(ElementKind::Tickbox).signal("s1"),
            ],
            HashMap::new(),
            &NullBus,
        );

        panel.set_signals(&strings(&["changed"]), &mut bus);
        assert_eq!(panel.signals(), &strings(&["changed", "s1"]));

        panel.set_signals(&[], &mut bus);
        assert_eq!(panel.signals().len(), panel.element_count());
    }

    #[test]
    fn test_set_signals_pushes_changed_property_to_all_collaborators() {
        let mut harness = TestHarness::with_shared(&[("locked", "1"), ("locked", "1")]);
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::Tickbox)
                .signal("1")
                .property("locked", false)],
            HashMap::new(),
            &NullBus,
        );

        panel.set_signals(&strings(&["0"]), &mut harness);
        let values = harness.shared.get("locked").unwrap();
        assert!(values.iter().all(|v| v == "0"));

        // same value again: no property write pending
        harness.shared.get_mut("locked").unwrap()[0] = "tampered".to_string();
        panel.set_signals(&strings(&["0"]), &mut harness);
        assert_eq!(harness.shared.get("locked").unwrap()[0], "tampered");
    }

    #[test]
    fn test_parent_only_property_written_to_panel() {
        let mut bus = TestHarness::with_shared(&[("mode", "shared-value")]);
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::TextInput { max_length: 16 })
                .signal("auto")
                .property("mode", true)],
            HashMap::new(),
            &NullBus,
        );

        panel.text_changed(0, "manual", &mut bus);
        assert_eq!(panel.property("mode"), Some("manual"));
        // collaborators untouched
        assert_eq!(bus.shared.get("mode").unwrap()[0], "shared-value");
    }

    #[test]
    fn test_button_emits_signal_and_effects() {
        let mut port = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Button)
                    .connection("signal_out1")
                    .signal("fire")
                    .effect("klaxon"),
                ElementDef::new(ElementKind::Button).signal("unwired").effect("lamp"),
            ],
            HashMap::new(),
            &NullBus,
        );

        panel.button_activated(0, &mut port);
        assert_eq!(port.sent, vec![("signal_out1".to_string(), "fire".to_string())]);
        assert_eq!(port.effects, vec![("klaxon".to_string(), EffectKind::Primary)]);

        // unwired button fires effects only
        panel.button_activated(1, &mut port);
        assert_eq!(port.sent.len(), 1);
        assert_eq!(port.effects.len(), 2);
    }

    #[test]
    fn test_tickbox_defers_emission_to_update() {
        let mut port = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::Tickbox)
                .connection("signal_out1")
                .signal("on")
                .effect("pump")],
            HashMap::new(),
            &NullBus,
        );

        panel.tickbox_toggled(0, true);
        assert!(port.sent.is_empty());

        panel.update(&mut port);
        assert_eq!(port.sent, vec![("signal_out1".to_string(), "on".to_string())]);
        assert_eq!(port.effects, vec![("pump".to_string(), EffectKind::Primary)]);

        panel.tickbox_toggled(0, false);
        panel.update(&mut port);
        assert_eq!(port.sent[1], ("signal_out1".to_string(), "0".to_string()));
        assert_eq!(port.effects[1], ("pump".to_string(), EffectKind::Secondary));
    }

    #[test]
    fn test_continuous_emission_repeats_every_tick() {
        let mut port = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::Tickbox)
                .connection("signal_out1")
                .signal("on")],
            HashMap::new(),
            &NullBus,
        );
        panel.tickbox_toggled(0, true);

        for _ in 0..3 {
            panel.update(&mut port);
        }
        assert_eq!(port.sent.len(), 3);
    }

    #[test]
    fn test_number_input_clamps_and_formats() {
        let mut bus = TestHarness::with_shared(&[("volume", "0")]);
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::NumberInput {
                min: 0.0,
                max: 10.0,
                integer_only: true,
            })
            .signal("0")
            .property("volume", false)],
            HashMap::new(),
            &NullBus,
        );

        panel.number_changed(0, 42.7, &mut bus);
        assert_eq!(panel.signal(0), Some("10"));
        // propagated immediately, unlike tickboxes
        assert_eq!(bus.shared.get("volume").unwrap()[0], "10");
    }

    #[test]
    fn test_text_input_truncates_to_max_length() {
        let mut bus = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![ElementDef::new(ElementKind::TextInput { max_length: 4 }).signal("")],
            HashMap::new(),
            &NullBus,
        );

        panel.text_changed(0, "overflowing", &mut bus);
        assert_eq!(panel.signal(0), Some("over"));
    }

    #[test]
    fn test_save_recomputes_from_live_elements() {
        let mut bus = TestHarness::default();
        let mut panel = SignalPanel::new(
            1,
            vec![
                ElementDef::new(ElementKind::Button).label("a").signal("1"),
                ElementDef::new(ElementKind::TextInput { max_length: 32 })
                    .label("b")
                    .signal("x"),
            ],
            HashMap::new(),
            &NullBus,
        );

        panel.text_changed(1, "hello,world", &mut bus);
        let (labels, signals) = panel.save();
        assert_eq!(labels, "a,b");
        // semicolon separator keeps commas inside signals intact
        assert_eq!(signals, "1;hello,world");
    }
}
