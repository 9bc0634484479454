//! Color maps for heatmaps and confusion matrices.

use image::Rgb;

/// Jet colormap: blue for 0, through cyan, yellow, to red for 255
pub fn jet(value: u8) -> Rgb<u8> {
    let x = value as f32 / 255.0;
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Sequential blue scale, light for 0 and dark for 1
pub fn blues(intensity: f64) -> (u8, u8, u8) {
    const LIGHT: (f64, f64, f64) = (247.0, 251.0, 255.0);
    const DARK: (f64, f64, f64) = (8.0, 48.0, 107.0);

    let t = intensity.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    (
        lerp(LIGHT.0, DARK.0),
        lerp(LIGHT.1, DARK.1),
        lerp(LIGHT.2, DARK.2),
    )
}
