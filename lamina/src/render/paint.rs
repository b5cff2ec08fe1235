// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painting of fills: solid colors, gradients and images.

use std::f64::consts::TAU;

use super::Surfaces;
use crate::document::LayerSource;
use crate::image::{PlacedImage, PremulColor};
use crate::kurbo::{Affine, Point, Vec2};
use crate::peniko::{ColorStops, Extend};
use crate::shape::desc::{
    FillDesc, Gradient, GradientKind, ImageLayout, Paint, Positioning, PositioningOrigin,
};
use crate::{Bounds, Result};

/// The coordinate systems a fill can be positioned in, each mapped to device pixels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FillFrame {
    pub layer: Affine,
    pub parent: Affine,
    pub artboard: Affine,
    /// Bounds of the layer in its own coordinates.
    pub bounds: Bounds,
}

impl FillFrame {
    /// Maps the unit square of a positioning origin to device pixels.
    fn unit_to_device(&self, origin: PositioningOrigin) -> Affine {
        match origin {
            PositioningOrigin::Layer if !self.bounds.is_unspecified() => {
                self.layer
                    * Affine::translate((self.bounds.x0, self.bounds.y0))
                    * Affine::scale_non_uniform(self.bounds.width(), self.bounds.height())
            }
            PositioningOrigin::Layer => self.layer,
            PositioningOrigin::Parent => self.parent,
            PositioningOrigin::Artboard => self.artboard,
        }
    }

    /// Maps the origin's own coordinates to device pixels, anchored at the layer bounds for
    /// [`PositioningOrigin::Layer`].
    fn origin_to_device(&self, origin: PositioningOrigin) -> Affine {
        match origin {
            PositioningOrigin::Layer if !self.bounds.is_unspecified() => {
                self.layer * Affine::translate((self.bounds.x0, self.bounds.y0))
            }
            PositioningOrigin::Layer => self.layer,
            PositioningOrigin::Parent => self.parent,
            PositioningOrigin::Artboard => self.artboard,
        }
    }
}

/// Paint `fill` over `area`, given in layer coordinates. Masking is left to the caller.
pub(crate) fn draw_fill(
    surfaces: &Surfaces<'_>,
    source: &dyn LayerSource,
    fill: &FillDesc,
    frame: &FillFrame,
    area: Bounds,
) -> Result<Option<PlacedImage>> {
    if !fill.visible || area.is_unspecified() {
        return Ok(None);
    }
    let device_area = area.transform(frame.layer);
    let positioning = fill.positioning.unwrap_or(Positioning {
        origin: PositioningOrigin::Layer,
        transform: Affine::IDENTITY,
    });
    match &fill.paint {
        Paint::Color(color) => Ok(Some(PlacedImage::solid(
            PremulColor::from(*color),
            device_area,
        ))),
        Paint::Gradient(gradient) => {
            let to_device = frame.unit_to_device(positioning.origin) * positioning.transform;
            draw_gradient(surfaces, gradient, to_device, device_area)
        }
        Paint::Image { key, layout } => {
            let Some(image) = source.image(key) else {
                log::warn!("Image {key:?} is not available");
                return Ok(None);
            };
            let (w, h) = (f64::from(image.width()), f64::from(image.height()));
            if w == 0. || h == 0. {
                return Ok(None);
            }
            let (image_to_device, tile) = match *layout {
                ImageLayout::Tile { scale } => (
                    frame.origin_to_device(positioning.origin)
                        * positioning.transform
                        * Affine::scale(scale),
                    true,
                ),
                layout => {
                    let unit = frame.unit_to_device(positioning.origin) * positioning.transform;
                    (unit * image_to_unit(layout, unit, w, h), false)
                }
            };
            if image_to_device.determinant().abs() < f64::EPSILON {
                return Ok(None);
            }
            let inverse = image_to_device.inverse();
            let (iw, ih) = (image.width() as i64, image.height() as i64);
            surfaces.produce(device_area.outer_pixel_bounds(), |x, y| {
                let q = inverse * pixel_center(x, y);
                let (mut ix, mut iy) = (q.x.floor() as i64, q.y.floor() as i64);
                if tile {
                    ix = ix.rem_euclid(iw);
                    iy = iy.rem_euclid(ih);
                } else if ix < 0 || iy < 0 || ix >= iw || iy >= ih {
                    return PremulColor::TRANSPARENT;
                }
                image.pixel(ix as u32, iy as u32)
            })
        }
    }
}

/// Maps image pixels into the positioning unit square.
fn image_to_unit(layout: ImageLayout, unit_to_device: Affine, w: f64, h: f64) -> Affine {
    let [a, b, c, d, _, _] = unit_to_device.as_coeffs();
    // Device lengths of the unit square's sides.
    let ux = Vec2::new(a, b).length().max(f64::EPSILON);
    let uy = Vec2::new(c, d).length().max(f64::EPSILON);
    let k = match layout {
        ImageLayout::Fill => (ux / w).max(uy / h),
        ImageLayout::Fit => (ux / w).min(uy / h),
        ImageLayout::Stretch | ImageLayout::Tile { .. } => {
            return Affine::scale_non_uniform(1. / w, 1. / h);
        }
    };
    let (sx, sy) = (k / ux, k / uy);
    Affine::translate(((1. - w * sx) / 2., (1. - h * sy) / 2.)) * Affine::scale_non_uniform(sx, sy)
}

fn draw_gradient(
    surfaces: &Surfaces<'_>,
    gradient: &Gradient,
    gradient_to_device: Affine,
    device_area: Bounds,
) -> Result<Option<PlacedImage>> {
    match gradient.stops.as_slice() {
        [] => return Ok(None),
        [stop] => {
            return Ok(Some(PlacedImage::solid(
                PremulColor::from(stop.color),
                device_area,
            )))
        }
        _ => {}
    }
    if gradient_to_device.determinant().abs() < f64::EPSILON {
        return Ok(None);
    }
    let inverse = gradient_to_device.inverse();
    surfaces.produce(device_area.outer_pixel_bounds(), |x, y| {
        let p = inverse * pixel_center(x, y);
        let t = match gradient.kind {
            GradientKind::Linear => p.x,
            GradientKind::Radial => p.to_vec2().length(),
            GradientKind::Angular => p.y.atan2(p.x).rem_euclid(TAU) / TAU,
        };
        sample_stops(&gradient.stops, extend(t, gradient.extend))
    })
}

fn pixel_center(x: i32, y: i32) -> Point {
    Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5)
}

fn extend(t: f64, extend: Extend) -> f64 {
    match extend {
        Extend::Pad => t.clamp(0., 1.),
        Extend::Repeat => t.rem_euclid(1.),
        Extend::Reflect => {
            let t = t.rem_euclid(2.);
            if t > 1. {
                2. - t
            } else {
                t
            }
        }
    }
}

/// Premultiplied interpolation between the stops around `t`.
fn sample_stops(stops: &ColorStops, t: f64) -> PremulColor {
    let t = t as f32;
    let mut prev = &stops[0];
    if t <= prev.offset {
        return PremulColor::from(prev.color);
    }
    for stop in stops.iter().skip(1) {
        if t <= stop.offset {
            let span = stop.offset - prev.offset;
            let k = if span > 0. {
                (t - prev.offset) / span
            } else {
                1.
            };
            return PremulColor::from(prev.color).lerp(PremulColor::from(stop.color), k);
        }
        prev = stop;
    }
    PremulColor::from(prev.color)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::Document;
    use crate::framebuffer::{FramebufferPool, PixmapAllocator};
    use crate::image::Bitmap;
    use crate::peniko::{Color, ColorStop};
    use crate::{PixelBounds, RenderMetrics};

    fn frame(bounds: Bounds) -> FillFrame {
        FillFrame {
            layer: Affine::IDENTITY,
            parent: Affine::IDENTITY,
            artboard: Affine::IDENTITY,
            bounds,
        }
    }

    fn red_to_blue(kind: GradientKind) -> FillDesc {
        let stops: ColorStops = [
            ColorStop {
                offset: 0.,
                color: Color::rgb8(255, 0, 0),
            },
            ColorStop {
                offset: 1.,
                color: Color::rgb8(0, 0, 255),
            },
        ]
        .into_iter()
        .collect();
        FillDesc::new(Paint::Gradient(Gradient {
            kind,
            stops,
            extend: Extend::Pad,
        }))
    }

    #[test]
    fn solid_fills_cover_the_area() {
        let pool = FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new()));
        let surfaces = Surfaces::new(&pool, 1024);
        let document = Document::default();
        let bounds = Bounds::new(2., 2., 6., 4.);
        let fill = FillDesc::color(Color::rgb8(0, 255, 0));
        let image = draw_fill(&surfaces, &document, &fill, &frame(bounds), bounds)
            .unwrap()
            .unwrap();
        assert_eq!(image.pixel_bounds(), PixelBounds::new(2, 2, 6, 4));
        assert_eq!(image.sample(3, 3), PremulColor::new(0., 1., 0., 1.));
    }

    #[test]
    fn default_linear_gradient_spans_the_layer() {
        let pool = FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new()));
        let surfaces = Surfaces::new(&pool, 1024);
        let document = Document::default();
        let bounds = Bounds::new(0., 0., 10., 1.);
        let image = draw_fill(
            &surfaces,
            &document,
            &red_to_blue(GradientKind::Linear),
            &frame(bounds),
            bounds,
        )
        .unwrap()
        .unwrap();
        let left = image.sample(0, 0);
        let right = image.sample(9, 0);
        assert!((left.r - 0.95).abs() < 1e-5 && (left.b - 0.05).abs() < 1e-5);
        assert!((right.b - 0.95).abs() < 1e-5);
        assert_eq!(left.a, 1.);
    }

    #[test]
    fn radial_gradient_is_centered_on_the_origin() {
        let pool = FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new()));
        let surfaces = Surfaces::new(&pool, 1024);
        let document = Document::default();
        let bounds = Bounds::new(-8., -8., 8., 8.);
        let fill = red_to_blue(GradientKind::Radial).with_positioning(Positioning {
            origin: PositioningOrigin::Parent,
            transform: Affine::scale(8.),
        });
        let image = draw_fill(&surfaces, &document, &fill, &frame(bounds), bounds)
            .unwrap()
            .unwrap();
        assert!(image.sample(0, 0).r > 0.9);
        // Padded past the radius.
        assert_eq!(image.sample(-8, -8), PremulColor::new(0., 0., 1., 1.));
    }

    #[test]
    fn extend_modes() {
        assert_eq!(extend(1.25, Extend::Pad), 1.);
        assert_eq!(extend(1.25, Extend::Repeat), 0.25);
        assert_eq!(extend(1.25, Extend::Reflect), 0.75);
        assert_eq!(extend(-0.25, Extend::Reflect), 0.25);
    }

    #[test]
    fn stretched_and_tiled_images() {
        let pool = FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new()));
        let surfaces = Surfaces::new(&pool, 1024);
        let mut document = Document::default();
        let mut bitmap = Bitmap::new(2, 1);
        bitmap.data.copy_from_slice(&[255, 0, 0, 255, 0, 0, 255, 255]);
        document.insert_image("pair", &bitmap);
        let bounds = Bounds::new(0., 0., 4., 2.);

        let stretch = FillDesc::new(Paint::Image {
            key: "pair".into(),
            layout: ImageLayout::Stretch,
        });
        let image = draw_fill(&surfaces, &document, &stretch, &frame(bounds), bounds)
            .unwrap()
            .unwrap();
        assert_eq!(image.sample(1, 1), PremulColor::new(1., 0., 0., 1.));
        assert_eq!(image.sample(2, 0), PremulColor::new(0., 0., 1., 1.));

        let tile = FillDesc::new(Paint::Image {
            key: "pair".into(),
            layout: ImageLayout::Tile { scale: 1. },
        });
        let image = draw_fill(&surfaces, &document, &tile, &frame(bounds), bounds)
            .unwrap()
            .unwrap();
        assert_eq!(image.sample(2, 1), PremulColor::new(1., 0., 0., 1.));
        assert_eq!(image.sample(3, 1), PremulColor::new(0., 0., 1., 1.));

        let missing = FillDesc::new(Paint::Image {
            key: "nope".into(),
            layout: ImageLayout::Fit,
        });
        assert!(draw_fill(&surfaces, &document, &missing, &frame(bounds), bounds)
            .unwrap()
            .is_none());
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        // A 2x1 image fit into a 4x4 square is 4x2, centered vertically.
        let unit = Affine::scale(4.);
        let m = unit * image_to_unit(ImageLayout::Fit, unit, 2., 1.);
        let top_left = m * Point::ZERO;
        let bottom_right = m * Point::new(2., 1.);
        assert!((top_left.x - 0.).abs() < 1e-9 && (top_left.y - 1.).abs() < 1e-9);
        assert!((bottom_right.x - 4.).abs() < 1e-9 && (bottom_right.y - 3.).abs() < 1e-9);
    }
}
