// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyframe animation of layer properties.
//!
//! A [`LayerAnimation`] drives one property of one layer through a list of keyframes. Each
//! keyframe's `delay` is measured from the previous keyframe (or from zero for the first one),
//! and the value moves from the previous keyframe's value to its own over that delay, shaped by
//! an optional [`Easing`]. Before the first keyframe and after the last one the nearest value is
//! held.
//!
//! Animations are attached to a [`Document`](crate::document::Document) with
//! [`set_animations`](crate::document::Document::set_animations) and sampled with
//! [`set_time`](crate::document::Document::set_time).

use smallvec::SmallVec;

use crate::kurbo::{Affine, Point};
use crate::peniko::Color;

/// Linear interpolation between two values.
pub trait Lerp: Clone {
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Affine {
    /// Interpolates the coefficients.
    fn lerp(&self, other: &Self, t: f64) -> Self {
        let (a, b) = (self.as_coeffs(), other.as_coeffs());
        Self::new(core::array::from_fn(|i| a[i].lerp(&b[i], t)))
    }
}

impl Lerp for Color {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        let channel = |a: u8, b: u8| {
            f64::from(a)
                .lerp(&f64::from(b), t)
                .round()
                .clamp(0., 255.) as u8
        };
        Self {
            r: channel(self.r, other.r),
            g: channel(self.g, other.g),
            b: channel(self.b, other.b),
            a: channel(self.a, other.a),
        }
    }
}

/// Timing of the transition into a keyframe.
///
/// A one-dimensional Bézier curve running from 0 to 1 through the given inner control values,
/// evaluated at the linear progress. No control values is linear timing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Easing {
    controls: SmallVec<[f64; 2]>,
}

impl Easing {
    pub fn new(controls: &[f64]) -> Self {
        Self {
            controls: SmallVec::from_slice(controls),
        }
    }

    /// A cubic curve with control values `c1` and `c2`.
    pub fn cubic(c1: f64, c2: f64) -> Self {
        Self::new(&[c1, c2])
    }

    pub fn controls(&self) -> &[f64] {
        &self.controls
    }

    /// Eased progress for linear progress `t` in `[0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        let mut p: SmallVec<[f64; 4]> = SmallVec::with_capacity(self.controls.len() + 2);
        p.push(0.);
        p.extend_from_slice(&self.controls);
        p.push(1.);
        // de Casteljau
        for n in (1..p.len()).rev() {
            for i in 0..n {
                p[i] = (1. - t) * p[i] + t * p[i + 1];
            }
        }
        p[0]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe<T> {
    /// Seconds since the previous keyframe, or since zero for the first one.
    pub delay: f64,
    /// Timing of the transition from the previous keyframe. Ignored on the first keyframe.
    pub easing: Option<Easing>,
    pub value: T,
}

impl<T> Keyframe<T> {
    pub fn new(delay: f64, value: T) -> Self {
        Self {
            delay,
            easing: None,
            value,
        }
    }

    #[must_use]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    /// Progress of the transition into this keyframe, `time` seconds after it started.
    fn progress(&self, time: f64) -> f64 {
        if time < 0. {
            return 0.;
        }
        if time >= self.delay {
            return 1.;
        }
        let t = time / self.delay;
        self.easing.as_ref().map_or(t, |easing| easing.apply(t))
    }
}

/// Value of `keyframes` at `time`, or `None` without keyframes.
pub fn sample<T: Lerp>(keyframes: &[Keyframe<T>], mut time: f64) -> Option<T> {
    let mut previous = keyframes.first()?;
    for keyframe in keyframes {
        if time < keyframe.delay {
            return Some(previous.value.lerp(&keyframe.value, keyframe.progress(time)));
        }
        time -= keyframe.delay;
        previous = keyframe;
    }
    Some(previous.value.clone())
}

/// The animated property of a layer and its keyframes.
#[derive(Clone, Debug, PartialEq)]
pub enum Animation {
    /// A transform applied in the parent's coordinates, after the layer's own transform.
    Transform(Vec<Keyframe<Affine>>),
    /// A rotation in radians about `center`, in the parent's coordinates.
    Rotation {
        center: Point,
        keyframes: Vec<Keyframe<f64>>,
    },
    /// A multiplier of the layer's opacity.
    Opacity(Vec<Keyframe<f64>>),
    /// Replaces the color of solid fills, in the layer and in every shape below it.
    FillColor(Vec<Keyframe<Color>>),
}

/// A sampled [`Animation`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatedValue {
    Transform(Affine),
    Rotation(f64),
    Opacity(f64),
    FillColor(Color),
}

/// An animation of one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerAnimation {
    pub layer: String,
    pub animation: Animation,
}

impl LayerAnimation {
    pub fn new(layer: impl Into<String>, animation: Animation) -> Self {
        Self {
            layer: layer.into(),
            animation,
        }
    }

    /// The animated value at `time` seconds, or `None` if there are no keyframes.
    pub fn value_at(&self, time: f64) -> Option<AnimatedValue> {
        match &self.animation {
            Animation::Transform(keyframes) => {
                sample(keyframes, time).map(AnimatedValue::Transform)
            }
            Animation::Rotation { keyframes, .. } => {
                sample(keyframes, time).map(AnimatedValue::Rotation)
            }
            Animation::Opacity(keyframes) => sample(keyframes, time).map(AnimatedValue::Opacity),
            Animation::FillColor(keyframes) => {
                sample(keyframes, time).map(AnimatedValue::FillColor)
            }
        }
    }

    /// The transform contributed at `time`. Identity unless this animates the transform or the
    /// rotation.
    pub fn transform_at(&self, time: f64) -> Affine {
        match (&self.animation, self.value_at(time)) {
            (_, Some(AnimatedValue::Transform(transform))) => transform,
            (Animation::Rotation { center, .. }, Some(AnimatedValue::Rotation(angle))) => {
                Affine::translate(center.to_vec2())
                    * Affine::rotate(angle)
                    * Affine::translate(-center.to_vec2())
            }
            _ => Affine::IDENTITY,
        }
    }

    /// The opacity multiplier at `time`. One unless this animates the opacity.
    pub fn opacity_at(&self, time: f64) -> f64 {
        match self.value_at(time) {
            Some(AnimatedValue::Opacity(opacity)) => opacity,
            _ => 1.,
        }
    }

    /// The fill color at `time`, if this animates the fill color.
    pub fn fill_color_at(&self, time: f64) -> Option<Color> {
        match self.value_at(time) {
            Some(AnimatedValue::FillColor(color)) => Some(color),
            _ => None,
        }
    }
}
