//! Display modes and the detection visibility filter.
//!
//! `filter` is a pure function over a detection pass: it never mutates a
//! detection and always preserves input order. Whether "person" counts as an
//! animal is a product policy decision, so the class set comes from
//! configuration rather than being hardcoded here.

use std::collections::HashSet;

use crate::detect::Detection;

/// Which detections are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// Render every detection.
    #[default]
    All,
    /// Render only detections whose label is in the configured animal set.
    AnimalsOnly,
}

impl DisplayMode {
    /// The other mode. Used by the controller's mode toggle.
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::All => DisplayMode::AnimalsOnly,
            DisplayMode::AnimalsOnly => DisplayMode::All,
        }
    }

    /// Short human-readable name for status lines.
    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::All => "all objects",
            DisplayMode::AnimalsOnly => "animals only",
        }
    }
}

/// Labels treated as animals under `DisplayMode::AnimalsOnly`.
#[derive(Clone, Debug)]
pub struct AnimalClassSet {
    classes: HashSet<String>,
}

/// Default animal classes (COCO labels). "person" is intentionally absent;
/// deployments that want it add it via configuration.
pub const DEFAULT_ANIMAL_CLASSES: [&str; 10] = [
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe",
];

impl AnimalClassSet {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.classes.contains(label)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for AnimalClassSet {
    fn default() -> Self {
        Self::new(DEFAULT_ANIMAL_CLASSES)
    }
}

/// Select the detections visible under `mode`.
///
/// `All` is the identity on the input sequence. `AnimalsOnly` keeps the
/// order-preserving subsequence whose label is in `animals`.
pub fn filter(detections: Vec<Detection>, mode: DisplayMode, animals: &AnimalClassSet) -> Vec<Detection> {
    match mode {
        DisplayMode::All => detections,
        DisplayMode::AnimalsOnly => detections
            .into_iter()
            .filter(|d| animals.contains(&d.label))
            .collect(),
    }
}
