//! Recipe data model.
//!
//! A [`Recipe`] is an ordered list of [`Step`]s plus two opaque blobs
//! (water and chemistry inputs) that the controller carries through
//! untouched. Recipes are edited elsewhere and handed to the engine
//! read-only; the only state the engine mutates is each [`Addition`]'s
//! `triggered` flag.
//!
//! ## Persisted form
//!
//! Recipes are stored as JSON. Loading goes through [`RecipeRecord`], a
//! permissive mirror of the on-disk shape, so that a damaged step or an
//! unknown enum string degrades to a skipped/defaulted entity plus a
//! [`Diagnostic`] instead of failing the whole recipe:
//!
//! | Problem                                | Outcome                          |
//! |----------------------------------------|----------------------------------|
//! | step is not an object / wrong types    | step skipped                     |
//! | unknown `step_type`                    | `StepKind::Generic`              |
//! | unknown `timeout_behavior`             | `CompletionPolicy::ManualAdvance`|
//! | only legacy `power_watts` present      | copied to ramp and hold caps     |
//! | addition is not an object              | addition skipped                 |
//! | `duration_min` outside 0..=1 day       | clamped into range               |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::consts::STEP_DURATION_MAX_MIN;

// ─── Enums ──────────────────────────────────────────────────────────

/// What a step is for. Drives power mode selection and editor defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(rename = "Step")]
    Generic,
    #[serde(rename = "Prep Water")]
    PrepWater,
    #[serde(rename = "Dough-in")]
    DoughIn,
    #[serde(rename = "Mash")]
    Mash,
    #[serde(rename = "Mash-out")]
    MashOut,
    #[serde(rename = "Sparge")]
    Sparge,
    #[serde(rename = "Boil Start")]
    BoilStart,
    #[serde(rename = "Boil Off")]
    BoilOff,
    #[serde(rename = "Chill")]
    Chill,
}

/// How heater power is derived for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// PID output scaled onto the active cap.
    Pid,
    /// Active cap applied directly.
    OpenLoop,
}

impl StepKind {
    pub const ALL: [StepKind; 9] = [
        StepKind::Generic,
        StepKind::PrepWater,
        StepKind::DoughIn,
        StepKind::Mash,
        StepKind::MashOut,
        StepKind::Sparge,
        StepKind::BoilStart,
        StepKind::BoilOff,
        StepKind::Chill,
    ];

    /// Display / persisted label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generic => "Step",
            Self::PrepWater => "Prep Water",
            Self::DoughIn => "Dough-in",
            Self::Mash => "Mash",
            Self::MashOut => "Mash-out",
            Self::Sparge => "Sparge",
            Self::BoilStart => "Boil Start",
            Self::BoilOff => "Boil Off",
            Self::Chill => "Chill",
        }
    }

    /// Power mode for this kind, before the boil-temperature override.
    ///
    /// Holding a rolling boil is the one phase where the PID fights the
    /// plateau at the phase change, so it runs open loop.
    pub const fn power_mode(self) -> PowerMode {
        match self {
            Self::BoilOff => PowerMode::OpenLoop,
            Self::Generic
            | Self::PrepWater
            | Self::DoughIn
            | Self::Mash
            | Self::MashOut
            | Self::Sparge
            | Self::BoilStart
            | Self::Chill => PowerMode::Pid,
        }
    }

    /// Field values an editor pre-fills for a new step of this kind.
    pub fn template(self, boil_temp: f64, default_watts: f64) -> StepTemplate {
        use CompletionPolicy::*;
        let (setpoint, duration_min, volume, watts, policy, additions): (
            f64,
            f64,
            f64,
            f64,
            CompletionPolicy,
            &'static [(&'static str, f64)],
        ) = match self {
            Self::Generic => (70.0, 0.0, 8.0, default_watts, AutoAdvance, &[]),
            Self::PrepWater => (
                0.0,
                0.0,
                8.0,
                0.0,
                AutoAdvance,
                &[
                    ("Add water per calculations", 0.0),
                    ("Add water salts per calculations", 0.0),
                ],
            ),
            Self::DoughIn => (
                156.0,
                0.0,
                8.0,
                default_watts,
                AutoAdvance,
                &[
                    ("Drop grain basket", 0.0),
                    ("Drop full grain bill", 0.0),
                    ("Mix well, no dough balls", 0.0),
                    ("Cover & turn on pump", 0.0),
                ],
            ),
            Self::Mash => (
                150.0,
                60.0,
                8.75,
                default_watts,
                AutoAdvance,
                &[
                    ("Mix grains", 45.0),
                    ("Mix grains", 30.0),
                    ("Mix grains", 15.0),
                    ("Mix grains", 0.0),
                    ("Turn off pump", 0.0),
                    ("Record SG", 0.0),
                ],
            ),
            Self::MashOut => (
                170.0,
                10.0,
                8.75,
                default_watts,
                AutoAdvance,
                &[
                    ("Remove cover", 10.0),
                    ("Lift & drain grains", 0.0),
                    ("Add make-up water if necessary", 0.0),
                ],
            ),
            Self::Sparge => (
                200.0,
                0.0,
                4.25,
                default_watts,
                AutoAdvance,
                &[("Remove grain basket", 0.0)],
            ),
            Self::BoilStart => (boil_temp, 0.0, 6.75, default_watts, ManualAdvance, &[]),
            Self::BoilOff => (
                boil_temp,
                60.0,
                6.75,
                default_watts,
                AutoAdvance,
                &[
                    ("Bittering hops", 60.0),
                    ("Flavor hops", 30.0),
                    ("Irish moss", 10.0),
                    ("Sanitize chiller", 9.0),
                    ("Aroma hops", 5.0),
                    ("Flameout hops", 0.0),
                ],
            ),
            Self::Chill => (
                70.0,
                15.0,
                5.75,
                0.0,
                AutoAdvance,
                &[("Take SG reading", 0.0)],
            ),
        };
        StepTemplate {
            setpoint,
            duration_min,
            volume,
            watts,
            policy,
            additions,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("boil") {
            return Ok(Self::BoilOff);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown step type '{s}'"))
    }
}

/// What happens when a step's timer runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionPolicy {
    #[serde(rename = "Auto Advance")]
    AutoAdvance,
    #[default]
    #[serde(rename = "Manual Advance")]
    ManualAdvance,
    /// Wait for the operator, then end the program.
    #[serde(rename = "End Program")]
    EndProgram,
}

impl CompletionPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AutoAdvance => "Auto Advance",
            Self::ManualAdvance => "Manual Advance",
            Self::EndProgram => "End Program",
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::AutoAdvance, Self::ManualAdvance, Self::EndProgram]
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown timeout behavior '{s}'"))
    }
}

/// Editor defaults for one step kind.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTemplate {
    pub setpoint: f64,
    pub duration_min: f64,
    pub volume: f64,
    pub watts: f64,
    pub policy: CompletionPolicy,
    pub additions: &'static [(&'static str, f64)],
}

// ─── Entities ───────────────────────────────────────────────────────

/// An operator alert keyed by minutes remaining in its step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addition {
    pub id: String,
    pub name: String,
    /// Fire when this many minutes remain.
    pub time_point_min: f64,
    /// Fired in the current pass through the step.
    #[serde(skip)]
    pub triggered: bool,
}

impl Addition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, time_point_min: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            time_point_min,
            triggered: false,
        }
    }
}

/// One recipe step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(rename = "step_type")]
    pub kind: StepKind,
    #[serde(default)]
    pub note: String,
    /// Explicit target.
    #[serde(rename = "setpoint_f")]
    pub setpoint: Option<f64>,
    /// Target used when no setpoint is given.
    #[serde(rename = "lauter_temp_f")]
    pub fallback_temp: Option<f64>,
    pub duration_min: f64,
    /// Cap while heating toward target.
    pub ramp_power_watts: Option<f64>,
    /// Cap once target is reached.
    pub hold_power_watts: Option<f64>,
    #[serde(rename = "timeout_behavior")]
    pub policy: CompletionPolicy,
    pub additions: Vec<Addition>,
    /// Liquid volume, for ramp estimation only.
    #[serde(rename = "lauter_volume")]
    pub volume: Option<f64>,
}

impl Step {
    /// Build a step pre-filled from its kind's template.
    pub fn from_template(
        id: impl Into<String>,
        kind: StepKind,
        boil_temp: f64,
        default_watts: f64,
    ) -> Self {
        let id = id.into();
        let t = kind.template(boil_temp, default_watts);
        let additions = t
            .additions
            .iter()
            .enumerate()
            .map(|(i, (name, at))| Addition::new(format!("{id}-a{i}"), *name, *at))
            .collect();
        Self {
            name: kind.label().to_string(),
            kind,
            note: String::new(),
            setpoint: Some(t.setpoint),
            fallback_temp: None,
            duration_min: t.duration_min,
            ramp_power_watts: Some(t.watts),
            hold_power_watts: Some(t.watts),
            policy: t.policy,
            additions,
            volume: Some(t.volume),
            id,
        }
    }

    /// Setpoint, else fallback temperature, else 0 (heater off).
    pub fn effective_target(&self) -> f64 {
        self.setpoint.or(self.fallback_temp).unwrap_or(0.0)
    }

    pub fn ramp_cap(&self, default_watts: f64) -> f64 {
        self.ramp_power_watts.unwrap_or(default_watts)
    }

    pub fn hold_cap(&self, default_watts: f64) -> f64 {
        self.hold_power_watts.unwrap_or(default_watts)
    }

    /// Step duration [s].
    pub fn duration_secs(&self) -> f64 {
        self.duration_min * 60.0
    }

    pub fn reset_additions(&mut self) {
        for a in &mut self.additions {
            a.triggered = false;
        }
    }

    pub fn all_additions_fired(&self) -> bool {
        self.additions.iter().all(|a| a.triggered)
    }
}

/// An ordered brewing program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
    /// Passed through unchanged.
    #[serde(default = "empty_object")]
    pub water_data: Value,
    /// Passed through unchanged.
    #[serde(default = "empty_object")]
    pub chemistry_data: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Recipe {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps,
            water_data: empty_object(),
            chemistry_data: empty_object(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Clear every addition flag in every step.
    pub fn reset_additions(&mut self) {
        for s in &mut self.steps {
            s.reset_additions();
        }
    }

    /// First positive step volume, used for whole-program estimates.
    pub fn first_volume_hint(&self) -> Option<f64> {
        self.steps
            .iter()
            .filter_map(|s| s.volume)
            .find(|v| *v > 0.0)
    }

    /// Parse persisted JSON, absorbing per-step damage.
    pub fn from_json(json: &str) -> Result<(Self, Vec<Diagnostic>), serde_json::Error> {
        let record: RecipeRecord = serde_json::from_str(json)?;
        Ok(Self::from_record(record))
    }

    /// Inflate a permissive record into a recipe.
    pub fn from_record(record: RecipeRecord) -> (Self, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let mut steps = Vec::with_capacity(record.steps.len());

        for (idx, raw) in record.steps.into_iter().enumerate() {
            let ctx = format!("recipe '{}' step {}", record.id, idx + 1);
            let rec: StepRecord = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    diags.push(Diagnostic::new(&ctx, format!("skipped: {e}")));
                    continue;
                }
            };
            steps.push(rec.into_step(idx, &ctx, &mut diags));
        }

        let recipe = Self {
            id: record.id,
            name: record.name,
            steps,
            water_data: record.water_data,
            chemistry_data: record.chemistry_data,
        };
        (recipe, diags)
    }

    /// The stock five-step program shipped with a fresh install.
    pub fn default_recipe() -> Self {
        #[allow(clippy::too_many_arguments)]
        fn step(
            id: &str,
            name: &str,
            kind: StepKind,
            setpoint: f64,
            duration_min: f64,
            volume: Option<f64>,
            policy: CompletionPolicy,
            note: &str,
            additions: &[(&str, f64)],
        ) -> Step {
            Step {
                id: id.to_string(),
                name: name.to_string(),
                kind,
                note: note.to_string(),
                setpoint: Some(setpoint),
                fallback_temp: None,
                duration_min,
                ramp_power_watts: Some(1800.0),
                hold_power_watts: Some(1800.0),
                policy,
                additions: additions
                    .iter()
                    .enumerate()
                    .map(|(i, (n, t))| Addition::new(format!("{id}-a{i}"), *n, *t))
                    .collect(),
                volume,
            }
        }

        use CompletionPolicy::*;
        let steps = vec![
            step(
                "default-1",
                "Step",
                StepKind::Generic,
                156.0,
                0.0,
                Some(7.5),
                AutoAdvance,
                "Heat to dough-in, reserve water, dough-in.",
                &[
                    ("Reserve 1.5 Gal for lautering", 0.0),
                    ("Dough-in", 0.0),
                    ("Turn on pump", 0.0),
                ],
            ),
            step(
                "default-2",
                "Mash",
                StepKind::Mash,
                152.0,
                60.0,
                Some(6.5),
                AutoAdvance,
                "Mash and take SG reading",
                &[("Take SG reading", 0.0)],
            ),
            step(
                "default-3",
                "Mash-out",
                StepKind::MashOut,
                170.0,
                10.0,
                None,
                AutoAdvance,
                "Mash-out, turn off pump, lift basket, lauter",
                &[
                    ("Turn off pump", 0.0),
                    ("Lift grain basket", 0.0),
                    ("Lauter with reserved water", 0.0),
                ],
            ),
            step(
                "default-4",
                "Boil",
                StepKind::BoilOff,
                212.0,
                60.0,
                Some(6.5),
                AutoAdvance,
                "Boil and follow hops schedule",
                &[
                    ("Bittering hops", 60.0),
                    ("Flavor hops", 30.0),
                    ("Irish Moss", 10.0),
                    ("Aroma hops", 5.0),
                ],
            ),
            step(
                "default-5",
                "Chill",
                StepKind::Chill,
                70.0,
                15.0,
                Some(5.5),
                EndProgram,
                "",
                &[("Take SG reading", 0.0)],
            ),
        ];
        Self::new("default", "Default Profile", steps)
    }
}

// ─── Persisted records ──────────────────────────────────────────────

/// Permissive on-disk recipe shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default = "unknown_recipe_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default = "empty_object")]
    pub water_data: Value,
    #[serde(default = "empty_object")]
    pub chemistry_data: Value,
}

fn unknown_recipe_name() -> String {
    "Unknown Profile".to_string()
}

#[derive(Debug, Deserialize)]
struct StepRecord {
    id: Option<String>,
    name: Option<String>,
    step_type: Option<String>,
    #[serde(default)]
    note: String,
    setpoint_f: Option<f64>,
    lauter_temp_f: Option<f64>,
    #[serde(default)]
    duration_min: f64,
    ramp_power_watts: Option<f64>,
    hold_power_watts: Option<f64>,
    /// Single cap written by releases before ramp/hold split.
    power_watts: Option<f64>,
    timeout_behavior: Option<String>,
    lauter_volume: Option<f64>,
    #[serde(default)]
    additions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AdditionRecord {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    time_point_min: f64,
}

impl StepRecord {
    fn into_step(self, idx: usize, ctx: &str, diags: &mut Vec<Diagnostic>) -> Step {
        let id = self.id.unwrap_or_else(|| format!("step-{}", idx + 1));

        let kind = match self.step_type.as_deref() {
            None => StepKind::Generic,
            Some(s) => s.parse().unwrap_or_else(|e: String| {
                diags.push(Diagnostic::new(ctx, format!("{e}, using Generic")));
                StepKind::Generic
            }),
        };
        let policy = match self.timeout_behavior.as_deref() {
            None => CompletionPolicy::ManualAdvance,
            Some(s) => s.parse().unwrap_or_else(|e: String| {
                diags.push(Diagnostic::new(ctx, format!("{e}, using Manual Advance")));
                CompletionPolicy::ManualAdvance
            }),
        };

        let (ramp, hold) = migrate_power(self.ramp_power_watts, self.hold_power_watts, self.power_watts);

        let duration_min = self.duration_min.clamp(0.0, STEP_DURATION_MAX_MIN);
        if duration_min != self.duration_min {
            diags.push(Diagnostic::new(
                ctx,
                format!("duration {} min out of range, using {duration_min}", self.duration_min),
            ));
        }

        let mut additions = Vec::with_capacity(self.additions.len());
        for (i, raw) in self.additions.into_iter().enumerate() {
            match serde_json::from_value::<AdditionRecord>(raw) {
                Ok(a) => additions.push(Addition::new(
                    a.id.unwrap_or_else(|| format!("{id}-a{i}")),
                    a.name.unwrap_or_else(|| "Alert".to_string()),
                    a.time_point_min,
                )),
                Err(e) => diags.push(Diagnostic::new(ctx, format!("addition {i} skipped: {e}"))),
            }
        }

        Step {
            name: self.name.unwrap_or_else(|| kind.label().to_string()),
            kind,
            note: self.note,
            setpoint: self.setpoint_f,
            fallback_temp: self.lauter_temp_f,
            duration_min,
            ramp_power_watts: ramp,
            hold_power_watts: hold,
            policy,
            additions,
            volume: self.lauter_volume,
            id,
        }
    }
}

/// Dual-cap upgrade: a missing ramp or hold cap inherits the legacy single cap.
pub fn migrate_power(
    ramp: Option<f64>,
    hold: Option<f64>,
    legacy: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    (ramp.or(legacy), hold.or(legacy))
}

/// A recoverable problem found in persisted data.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub context: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(context: &str, message: impl Into<String>) -> Self {
        Self {
            context: context.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
