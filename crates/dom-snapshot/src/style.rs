//! Inline-style inspection.

use crate::document::Rect;

/// Read `left`/`top`/`width`/`height` pixel declarations from an inline
/// style. Returns `None` when none of them is present.
pub fn geometry_from_style(style: &str) -> Option<Rect> {
    let mut rect = Rect::default();
    let mut seen = false;
    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let Some(pixels) = parse_pixels(value) else {
            continue;
        };
        match property.trim().to_ascii_lowercase().as_str() {
            "left" | "x" => rect.x = pixels,
            "top" | "y" => rect.y = pixels,
            "width" => rect.width = pixels,
            "height" => rect.height = pixels,
            _ => continue,
        }
        seen = true;
    }
    seen.then_some(rect)
}

fn parse_pixels(value: &str) -> Option<f64> {
    let trimmed = value.trim().trim_end_matches("!important").trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    number.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pixel_geometry() {
        let rect = geometry_from_style("position:absolute; left: 10px; top:20px; width:100px; height: 32.5px")
            .unwrap();
        assert_eq!(rect, Rect { x: 10.0, y: 20.0, width: 100.0, height: 32.5 });
    }

    #[test]
    fn ignores_unrelated_declarations() {
        assert!(geometry_from_style("color: red; display:block").is_none());
        assert!(geometry_from_style("width: auto").is_none());
        let partial = geometry_from_style("width: 50px !important").unwrap();
        assert_eq!(partial.width, 50.0);
        assert_eq!(partial.x, 0.0);
    }
}
