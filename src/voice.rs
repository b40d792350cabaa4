//! Voice payloads: the typed record a renderer receives for each event.
//!
//! Patterns built from scripts carry [`Value::Map`]s; `voices()` converts
//! them at the renderer boundary. The engine only copies and merges these
//! fields, it never interprets them.

use crate::pattern::Pattern;
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::trace;

/// Control names understood by [`VoiceData::set`], with their aliases.
pub const CONTROL_NAMES: &[(&str, &str)] = &[
    ("s", "sound"),
    ("sound", "sound"),
    ("bank", "bank"),
    ("n", "index"),
    ("index", "index"),
    ("note", "note"),
    ("gain", "gain"),
    ("velocity", "velocity"),
    ("pan", "pan"),
    ("speed", "speed"),
    ("cutoff", "cutoff"),
    ("lpf", "cutoff"),
    ("ctf", "cutoff"),
    ("resonance", "resonance"),
    ("lpq", "resonance"),
    ("hcutoff", "hcutoff"),
    ("hpf", "hcutoff"),
    ("hresonance", "hresonance"),
    ("hpq", "hresonance"),
    ("attack", "attack"),
    ("att", "attack"),
    ("decay", "decay"),
    ("sustain", "sustain"),
    ("sus", "sustain"),
    ("release", "release"),
    ("rel", "release"),
    ("orbit", "orbit"),
];

/// The canonical field name for a control name or alias.
pub fn canonical_control(name: &str) -> Option<&'static str> {
    CONTROL_NAMES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Parameters for one voice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceData {
    pub sound: Option<String>,
    pub bank: Option<String>,
    pub index: Option<i64>,
    /// Note name or MIDI number, left for the renderer to resolve.
    pub note: Option<Value>,
    pub gain: Option<f64>,
    pub velocity: Option<f64>,
    pub pan: Option<f64>,
    pub speed: Option<f64>,
    pub cutoff: Option<f64>,
    pub resonance: Option<f64>,
    pub hcutoff: Option<f64>,
    pub hresonance: Option<f64>,
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
    pub orbit: Option<i64>,
    /// Fields with no dedicated slot.
    pub extra: BTreeMap<String, Value>,
}

impl VoiceData {
    /// Build a voice from a value.
    ///
    /// Maps set their fields, strings name a sound and numbers a note.
    pub fn from_value(value: &Value) -> VoiceData {
        let mut voice = VoiceData::default();
        match value {
            Value::Map(fields) => {
                for (name, field) in fields {
                    voice.set(name, field);
                }
            }
            Value::Str(_) => voice.set("sound", value),
            Value::Number(_) => voice.set("note", value),
            _ => trace!(kind = value.type_name(), "value carries no voice fields"),
        }
        voice
    }

    /// Set one control by name or alias.
    pub fn set(&mut self, name: &str, value: &Value) {
        let Some(canonical) = canonical_control(name) else {
            self.extra.insert(name.to_string(), value.clone());
            return;
        };
        let number = value.as_number();
        match canonical {
            "sound" => {
                // "bd:3" names sample 3 of the bd set.
                let text = value.to_string();
                match text.split_once(':') {
                    Some((sound, index)) if index.parse::<i64>().is_ok() => {
                        self.sound = Some(sound.to_string());
                        self.index = index.parse().ok();
                    }
                    _ => self.sound = Some(text),
                }
            }
            "bank" => self.bank = Some(value.to_string()),
            "note" => self.note = Some(value.clone()),
            "index" if number.is_some() => self.index = number.map(|n| n.floor() as i64),
            "orbit" if number.is_some() => self.orbit = number.map(|n| n.floor() as i64),
            _ => {
                if let (Some(n), Some(slot)) = (number, self.slot(canonical)) {
                    *slot = Some(n);
                    return;
                }
                trace!(control = canonical, value = %value, "non-numeric control kept as extra");
                self.extra.insert(canonical.to_string(), value.clone());
            }
        }
    }

    fn slot(&mut self, canonical: &str) -> Option<&mut Option<f64>> {
        match canonical {
            "gain" => Some(&mut self.gain),
            "velocity" => Some(&mut self.velocity),
            "pan" => Some(&mut self.pan),
            "speed" => Some(&mut self.speed),
            "cutoff" => Some(&mut self.cutoff),
            "resonance" => Some(&mut self.resonance),
            "hcutoff" => Some(&mut self.hcutoff),
            "hresonance" => Some(&mut self.hresonance),
            "attack" => Some(&mut self.attack),
            "decay" => Some(&mut self.decay),
            "sustain" => Some(&mut self.sustain),
            "release" => Some(&mut self.release),
            _ => None,
        }
    }

    /// Fields set in `other` override this voice's.
    pub fn merge(&self, other: &VoiceData) -> VoiceData {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        VoiceData {
            sound: other.sound.clone().or_else(|| self.sound.clone()),
            bank: other.bank.clone().or_else(|| self.bank.clone()),
            index: other.index.or(self.index),
            note: other.note.clone().or_else(|| self.note.clone()),
            gain: other.gain.or(self.gain),
            velocity: other.velocity.or(self.velocity),
            pan: other.pan.or(self.pan),
            speed: other.speed.or(self.speed),
            cutoff: other.cutoff.or(self.cutoff),
            resonance: other.resonance.or(self.resonance),
            hcutoff: other.hcutoff.or(self.hcutoff),
            hresonance: other.hresonance.or(self.hresonance),
            attack: other.attack.or(self.attack),
            decay: other.decay.or(self.decay),
            sustain: other.sustain.or(self.sustain),
            release: other.release.or(self.release),
            orbit: other.orbit.or(self.orbit),
            extra,
        }
    }

    /// Effective gain, including velocity.
    pub fn level(&self) -> f64 {
        self.gain.unwrap_or(1.0) * self.velocity.unwrap_or(1.0)
    }
}

impl Pattern<Value> {
    /// Convert values to voice payloads for the renderer.
    pub fn voices(self) -> Pattern<VoiceData> {
        self.fmap(|v| VoiceData::from_value(&v))
    }
}
