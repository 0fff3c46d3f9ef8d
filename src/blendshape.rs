//! Blendshape names and full-weight vectors.
//!
//! The name set is the 52 ARKit face shapes followed by the three roll
//! channels the avatar rig exposes. Order is canonical: it is the key order
//! of every serialized keyframe.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! blendshapes {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A named facial deformation target.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Blendshape {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl Blendshape {
            /// Every blendshape in canonical order.
            pub const ALL: &'static [Blendshape] = &[$(Blendshape::$variant),+];

            /// The rig-facing name, e.g. `jawOpen`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Blendshape::$variant => $name,)+
                }
            }
        }

        impl FromStr for Blendshape {
            type Err = UnknownBlendshape;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Blendshape::$variant),)+
                    _ => Err(UnknownBlendshape(s.to_owned())),
                }
            }
        }
    };
}

blendshapes! {
    EyeBlinkLeft => "eyeBlinkLeft",
    EyeLookDownLeft => "eyeLookDownLeft",
    EyeLookInLeft => "eyeLookInLeft",
    EyeLookOutLeft => "eyeLookOutLeft",
    EyeLookUpLeft => "eyeLookUpLeft",
    EyeSquintLeft => "eyeSquintLeft",
    EyeWideLeft => "eyeWideLeft",
    EyeBlinkRight => "eyeBlinkRight",
    EyeLookDownRight => "eyeLookDownRight",
    EyeLookInRight => "eyeLookInRight",
    EyeLookOutRight => "eyeLookOutRight",
    EyeLookUpRight => "eyeLookUpRight",
    EyeSquintRight => "eyeSquintRight",
    EyeWideRight => "eyeWideRight",
    JawForward => "jawForward",
    JawLeft => "jawLeft",
    JawRight => "jawRight",
    JawOpen => "jawOpen",
    MouthClose => "mouthClose",
    MouthFunnel => "mouthFunnel",
    MouthPucker => "mouthPucker",
    MouthLeft => "mouthLeft",
    MouthRight => "mouthRight",
    MouthSmileLeft => "mouthSmileLeft",
    MouthSmileRight => "mouthSmileRight",
    MouthFrownLeft => "mouthFrownLeft",
    MouthFrownRight => "mouthFrownRight",
    MouthDimpleLeft => "mouthDimpleLeft",
    MouthDimpleRight => "mouthDimpleRight",
    MouthStretchLeft => "mouthStretchLeft",
    MouthStretchRight => "mouthStretchRight",
    MouthRollLower => "mouthRollLower",
    MouthRollUpper => "mouthRollUpper",
    MouthShrugLower => "mouthShrugLower",
    MouthShrugUpper => "mouthShrugUpper",
    MouthPressLeft => "mouthPressLeft",
    MouthPressRight => "mouthPressRight",
    MouthLowerDownLeft => "mouthLowerDownLeft",
    MouthLowerDownRight => "mouthLowerDownRight",
    MouthUpperUpLeft => "mouthUpperUpLeft",
    MouthUpperUpRight => "mouthUpperUpRight",
    BrowDownLeft => "browDownLeft",
    BrowDownRight => "browDownRight",
    BrowInnerUp => "browInnerUp",
    BrowOuterUpLeft => "browOuterUpLeft",
    BrowOuterUpRight => "browOuterUpRight",
    CheekPuff => "cheekPuff",
    CheekSquintLeft => "cheekSquintLeft",
    CheekSquintRight => "cheekSquintRight",
    NoseSneerLeft => "noseSneerLeft",
    NoseSneerRight => "noseSneerRight",
    TongueOut => "tongueOut",
    HeadRoll => "headRoll",
    LeftEyeRoll => "leftEyeRoll",
    RightEyeRoll => "rightEyeRoll",
}

/// Number of blendshapes in a full vector.
pub const BLENDSHAPE_COUNT: usize = Blendshape::ALL.len();

impl Blendshape {
    /// Position of this blendshape in [`Blendshape::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Blendshape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name outside the blendshape set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown blendshape: {0}")]
pub struct UnknownBlendshape(pub String);

/// A partial vector: only the listed shapes differ from neutral.
pub type PartialShape = [(Blendshape, f32)];

/// A full blendshape vector with one weight in `[0, 1]` per name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendshapeVector {
    weights: [f32; BLENDSHAPE_COUNT],
}

impl BlendshapeVector {
    /// The all-zero rest pose.
    pub const NEUTRAL: Self = Self {
        weights: [0.0; BLENDSHAPE_COUNT],
    };

    /// The neutral pose.
    pub fn neutral() -> Self {
        Self::NEUTRAL
    }

    /// Neutral pose overridden by `partial`. Weights are clamped to `[0, 1]`.
    pub fn from_partial(partial: &PartialShape) -> Self {
        let mut vector = Self::NEUTRAL;
        for &(shape, weight) in partial {
            vector.set(shape, weight);
        }
        vector
    }

    /// Weight of a single blendshape.
    pub fn get(&self, shape: Blendshape) -> f32 {
        self.weights[shape.index()]
    }

    /// Set a weight, clamped to `[0, 1]`. NaN becomes 0.
    pub fn set(&mut self, shape: Blendshape, weight: f32) {
        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        self.weights[shape.index()] = weight;
    }

    /// Whether every weight is zero.
    pub fn is_neutral(&self) -> bool {
        self.weights.iter().all(|w| *w == 0.0)
    }

    /// Iterate `(shape, weight)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Blendshape, f32)> + '_ {
        Blendshape::ALL
            .iter()
            .map(move |shape| (*shape, self.weights[shape.index()]))
    }
}

impl Default for BlendshapeVector {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl Serialize for BlendshapeVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(BLENDSHAPE_COUNT))?;
        for (shape, weight) in self.iter() {
            map.serialize_entry(shape.as_str(), &weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BlendshapeVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(VectorVisitor)
    }
}

struct VectorVisitor;

impl<'de> Visitor<'de> for VectorVisitor {
    type Value = BlendshapeVector;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a map with all {BLENDSHAPE_COUNT} blendshape weights")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut vector = BlendshapeVector::NEUTRAL;
        let mut seen = [false; BLENDSHAPE_COUNT];

        while let Some(name) = access.next_key::<String>()? {
            let shape = Blendshape::from_str(&name).map_err(de::Error::custom)?;
            if seen[shape.index()] {
                return Err(de::Error::custom(format!("duplicate blendshape: {name}")));
            }
            let weight: f32 = access.next_value()?;
            if !(0.0..=1.0).contains(&weight) {
                return Err(de::Error::custom(format!(
                    "weight for {name} out of range: {weight}"
                )));
            }
            seen[shape.index()] = true;
            vector.weights[shape.index()] = weight;
        }

        if let Some(missing) = Blendshape::ALL.iter().find(|s| !seen[s.index()]) {
            return Err(de::Error::custom(format!("missing blendshape: {missing}")));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn name_set_has_fifty_five_unique_entries() {
        assert_eq!(BLENDSHAPE_COUNT, 55);
        let mut names: Vec<&str> = Blendshape::ALL.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 55);
    }

    #[test]
    fn index_matches_canonical_order() {
        for (i, shape) in Blendshape::ALL.iter().enumerate() {
            assert_eq!(shape.index(), i);
        }
        assert_eq!(Blendshape::ALL[17], Blendshape::JawOpen);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for shape in Blendshape::ALL {
            assert_eq!(Blendshape::from_str(shape.as_str()).unwrap(), *shape);
        }
        assert!(Blendshape::from_str("jawopen").is_err());
    }

    #[test]
    fn from_partial_overrides_only_listed_shapes() {
        let v = BlendshapeVector::from_partial(&[
            (Blendshape::JawOpen, 0.8),
            (Blendshape::MouthClose, 0.1),
        ]);
        assert_eq!(v.get(Blendshape::JawOpen), 0.8);
        assert_eq!(v.get(Blendshape::MouthClose), 0.1);
        assert_eq!(v.iter().filter(|(_, w)| *w != 0.0).count(), 2);
        assert!(!v.is_neutral());
    }

    #[test]
    fn set_clamps_out_of_range_weights() {
        let mut v = BlendshapeVector::neutral();
        v.set(Blendshape::JawOpen, 1.7);
        v.set(Blendshape::MouthClose, -0.3);
        v.set(Blendshape::TongueOut, f32::NAN);
        assert_eq!(v.get(Blendshape::JawOpen), 1.0);
        assert_eq!(v.get(Blendshape::MouthClose), 0.0);
        assert_eq!(v.get(Blendshape::TongueOut), 0.0);
    }

    #[test]
    fn serializes_every_name_in_order() {
        let json = serde_json::to_string(&BlendshapeVector::neutral()).unwrap();
        assert!(json.starts_with(r#"{"eyeBlinkLeft":0.0"#));
        assert!(json.ends_with(r#""rightEyeRoll":0.0}"#));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 55);
    }

    #[test]
    fn deserialize_rejects_partial_maps() {
        let err = serde_json::from_str::<BlendshapeVector>(r#"{"jawOpen":0.5}"#).unwrap_err();
        assert!(err.to_string().contains("missing blendshape"));
    }

    #[test]
    fn deserialize_rejects_unknown_names() {
        let mut value = serde_json::to_value(BlendshapeVector::neutral()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("smirk".into(), serde_json::json!(0.2));
        let err = serde_json::from_value::<BlendshapeVector>(value).unwrap_err();
        assert!(err.to_string().contains("unknown blendshape"));
    }

    #[test]
    fn deserialize_accepts_full_maps() {
        let original = BlendshapeVector::from_partial(&[(Blendshape::MouthPucker, 0.9)]);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: BlendshapeVector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
