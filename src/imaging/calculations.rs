//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate "contain" dimensions for a width bound.
///
/// Scales the source so its width fits within `max_width`, preserving the
/// aspect ratio. Sources already narrower than the bound keep their
/// native size: the result never enlarges.
///
/// # Arguments
/// * `source` - Source image dimensions (width, height)
/// * `max_width` - Maximum output width in pixels
///
/// # Returns
/// * `(width, height)` - Output dimensions, each at least 1
///
/// # Examples
/// ```
/// # use pixcache::imaging::calculate_contain_dimensions;
/// // 1200x800 bounded to 300 wide → 300x200
/// assert_eq!(calculate_contain_dimensions((1200, 800), 300), (300, 200));
///
/// // Already narrow enough → unchanged
/// assert_eq!(calculate_contain_dimensions((200, 100), 300), (200, 100));
/// ```
pub fn calculate_contain_dimensions(source: (u32, u32), max_width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;

    if src_w <= max_width || src_w == 0 {
        return (src_w, src_h);
    }

    let ratio = max_width as f64 / src_w as f64;
    let h = (src_h as f64 * ratio).round().max(1.0) as u32;
    (max_width.max(1), h)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_contain_dimensions tests
    // =========================================================================

    #[test]
    fn contain_landscape_downscale() {
        // 1200x800 → 300 wide: 800 * (300/1200) = 200
        assert_eq!(calculate_contain_dimensions((1200, 800), 300), (300, 200));
    }

    #[test]
    fn contain_portrait_downscale() {
        // 800x1200 → 400 wide: 1200 * (400/800) = 600
        assert_eq!(calculate_contain_dimensions((800, 1200), 400), (400, 600));
    }

    #[test]
    fn contain_never_enlarges() {
        assert_eq!(calculate_contain_dimensions((200, 150), 1024), (200, 150));
    }

    #[test]
    fn contain_exact_width_unchanged() {
        assert_eq!(calculate_contain_dimensions((1024, 768), 1024), (1024, 768));
    }

    #[test]
    fn contain_rounds_height() {
        // 1000x333 → 300 wide: 333 * 0.3 = 99.9 → 100
        assert_eq!(calculate_contain_dimensions((1000, 333), 300), (300, 100));
    }

    #[test]
    fn contain_extreme_panorama_keeps_one_pixel() {
        assert_eq!(calculate_contain_dimensions((10000, 2), 100), (100, 1));
    }
}
